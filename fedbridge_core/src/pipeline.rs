//! The "TRANSLATION" Pipeline - Object and Interaction Translation
//!
//! Moves object state between the local model and the federation:
//!
//! ```text
//!  RTI                         pipeline                          local model
//!  ---                         --------                          -----------
//!  Discover ─────────────────► DISCOVERED
//!  Reflect ──► attribute_name ─► PENDING ──(required ready)──► materialize (ghost | link)
//!  Reflect (proxy known) ─────► decode_attribute ──────────────► set_property
//!  Remove ───────────────────► REMOVED ──► unlink | destroy_ghost
//!
//!  RegisterObjectInstance ◄──── tag ◄───────────────────────── object created
//!  return(handle) ───────────► TRACKED_LOCAL ──► full update
//!  UpdateAttributeValues ◄──── encode_attribute ◄───────────── properties changed
//!  DeleteObjectInstance ◄───── REMOVED ◄────────────────────── object deleted
//! ```
//!
//! Per-attribute failures (unresolved handle, codec error) are logged and the
//! attribute is left out; messages about objects or classes this federate
//! does not own are dropped.

use crate::catalogue::{ObjectCatalogue, ObjectState, SharedCatalogue, TagGenerator};
use crate::config::LivenessConfig;
use crate::converter::{EncodedAttributes, InteractionConverter, Materialized, ObjectConverter};
use crate::federation::FederateStatus;
use crate::liveness::LivenessMonitor;
use fedbridge_env::{
    AttributeHandle, AttributeValues, HandleResolver, InteractionClassHandle, LinkStatus,
    LocalInteraction, LocalModel, LocalObjectId, ObjectClassHandle, ObjectHandle,
    ParameterValues, PubSubPolicy, RequestId, ReturnValue, RtiAmbassador, RtiRequest, RtiReturn,
    SimulationState,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Collaborators the pipeline talks to.
#[derive(Clone)]
pub struct PipelineContext {
    pub rti: Arc<dyn RtiAmbassador>,
    pub handles: Arc<dyn HandleResolver>,
    pub model: Arc<dyn LocalModel>,
    pub policy: Arc<dyn PubSubPolicy>,
}

struct ObjectRegistration {
    converter: Box<dyn ObjectConverter>,
    class: Option<ObjectClassHandle>,
    publish: bool,
    subscribe: bool,
}

struct InteractionRegistration {
    converter: Box<dyn InteractionConverter>,
    class: Option<InteractionClassHandle>,
    publish: bool,
    subscribe: bool,
}

#[derive(Debug)]
struct PendingRegistration {
    proxy: LocalObjectId,
    registration: usize,
    tag: String,
    deleted: bool,
}

/// Object and interaction translation between local model and federation.
pub struct TranslationPipeline {
    federate_name: String,
    ctx: PipelineContext,

    objects: Vec<ObjectRegistration>,
    interactions: Vec<InteractionRegistration>,

    catalogue: SharedCatalogue,
    tags: TagGenerator,
    liveness: LivenessMonitor,

    registrations: HashMap<RequestId, PendingRegistration>,

    /// Local objects bound to remote objects during this run
    linked: HashSet<LocalObjectId>,

    model_subscribed: bool,
    now: i64,
}

impl TranslationPipeline {
    pub fn new(
        federate_name: impl Into<String>,
        ctx: PipelineContext,
        liveness: &LivenessConfig,
    ) -> Self {
        let federate_name = federate_name.into();
        Self {
            tags: TagGenerator::new(federate_name.clone()),
            federate_name,
            ctx,
            objects: Vec::new(),
            interactions: Vec::new(),
            catalogue: ObjectCatalogue::shared(),
            liveness: LivenessMonitor::new(liveness),
            registrations: HashMap::new(),
            linked: HashSet::new(),
            model_subscribed: false,
            now: 0,
        }
    }

    pub fn register_object_converter(&mut self, converter: Box<dyn ObjectConverter>) {
        debug!(
            "Registered object converter {} <-> {}",
            converter.fom_class(),
            converter.odm_class()
        );
        self.objects.push(ObjectRegistration {
            converter,
            class: None,
            publish: false,
            subscribe: false,
        });
    }

    pub fn register_interaction_converter(&mut self, converter: Box<dyn InteractionConverter>) {
        debug!(
            "Registered interaction converter {} <-> {}",
            converter.fom_class(),
            converter.odm_class()
        );
        self.interactions.push(InteractionRegistration {
            converter,
            class: None,
            publish: false,
            subscribe: false,
        });
    }

    // ========================================================================
    // FEDERATE STATUS
    // ========================================================================

    pub fn on_federate_status_changed(&mut self, status: FederateStatus) {
        match status {
            FederateStatus::PostJoin => self.declare(),
            FederateStatus::PreResign => {
                debug!("Clearing heartbeat and timeout registrations");
                self.liveness.clear();
            }
            FederateStatus::PostResign => {
                self.catalogue.lock().clear();
                self.registrations.clear();
                self.linked.clear();
                for reg in &mut self.objects {
                    reg.class = None;
                    reg.publish = false;
                    reg.subscribe = false;
                }
                for reg in &mut self.interactions {
                    reg.class = None;
                    reg.publish = false;
                    reg.subscribe = false;
                }
            }
        }
    }

    /// Resolves class handles and declares publications and subscriptions.
    fn declare(&mut self) {
        for reg in &mut self.objects {
            let fom_class = reg.converter.fom_class().to_string();
            let class = match self.ctx.handles.object_class_handle(&fom_class) {
                Ok(class) => class,
                Err(e) => {
                    warn!("Object class {} not in FOM: {}", fom_class, e);
                    continue;
                }
            };
            reg.class = Some(class);

            if self.ctx.policy.is_object_published(&fom_class) {
                let attributes =
                    resolve_attributes(&*self.ctx.handles, class, &reg.converter.publish_attributes());
                if attributes.is_empty() {
                    debug!("{} has no publishable attributes, not publishing", fom_class);
                } else {
                    reg.publish = send(
                        &*self.ctx.rti,
                        RtiRequest::PublishObjectClass { class, attributes },
                    );
                }
            }

            if self.ctx.policy.is_object_subscribed(&fom_class) {
                let attributes = resolve_attributes(
                    &*self.ctx.handles,
                    class,
                    &reg.converter.subscribe_attributes(),
                );
                if attributes.is_empty() {
                    debug!("{} has no subscribable attributes, not subscribing", fom_class);
                } else {
                    reg.subscribe = send(
                        &*self.ctx.rti,
                        RtiRequest::SubscribeObjectClassAttributes { class, attributes },
                    );
                }
            }

            info!(
                "Object class {}: publish={} subscribe={}",
                fom_class, reg.publish, reg.subscribe
            );
        }

        for reg in &mut self.interactions {
            let fom_class = reg.converter.fom_class().to_string();
            let class = match self.ctx.handles.interaction_class_handle(&fom_class) {
                Ok(class) => class,
                Err(e) => {
                    warn!("Interaction class {} not in FOM: {}", fom_class, e);
                    continue;
                }
            };
            reg.class = Some(class);

            if self.ctx.policy.is_interaction_published(&fom_class) {
                reg.publish = send(&*self.ctx.rti, RtiRequest::PublishInteractionClass { class });
            }
            if self.ctx.policy.is_interaction_subscribed(&fom_class) {
                reg.subscribe = send(&*self.ctx.rti, RtiRequest::SubscribeInteractionClass { class });
            }

            info!(
                "Interaction class {}: publish={} subscribe={}",
                fom_class, reg.publish, reg.subscribe
            );
        }
    }

    /// Subscribes the local model classes once the model is available.
    pub fn on_simulation_state(&mut self, state: SimulationState) {
        if self.model_subscribed || !state.is_model_available() {
            return;
        }
        self.model_subscribed = true;
        for reg in &self.objects {
            self.ctx.model.subscribe_class(reg.converter.odm_class());
        }
        debug!("Subscribed {} local model classes", self.objects.len());
    }

    // ========================================================================
    // INBOUND
    // ========================================================================

    pub fn process_discover(&mut self, object: ObjectHandle, class: ObjectClassHandle, name: &str) {
        let Some(index) = self.subscribed_registration(class) else {
            debug!("Dropping discovery of {} ({}): no subscribed converter", object, class);
            return;
        };
        let fom_class = self.objects[index].converter.fom_class().to_string();

        if !self.catalogue.lock().discover(object, class, &fom_class, name) {
            debug!("Ignoring repeated discovery of {}", object);
            return;
        }
        debug!("Discovered {} '{}' of {}", object, name, fom_class);
        self.liveness.record_inbound(object, self.now);
    }

    pub fn process_reflect(&mut self, object: ObjectHandle, attributes: &AttributeValues, _tag: &[u8]) {
        let (class, state, proxy) = {
            let catalogue = self.catalogue.lock();
            match catalogue.get(object) {
                Some(record) => (record.class, record.state, record.proxy),
                None => {
                    debug!("Dropping reflection for unknown {}", object);
                    return;
                }
            }
        };
        if !state.is_remote() {
            debug!("Dropping reflection for {} in state {:?}", object, state);
            return;
        }
        let Some(index) = self.registration_for_class(class) else {
            debug!("Dropping reflection for {}: no converter for {}", object, class);
            return;
        };
        self.liveness.record_inbound(object, self.now);

        let named: Vec<(String, &Vec<u8>)> = attributes
            .iter()
            .filter_map(|(handle, bytes)| match self.ctx.handles.attribute_name(class, *handle) {
                Ok(name) => Some((name, bytes)),
                Err(e) => {
                    warn!("Skipping attribute of {}: {}", object, e);
                    None
                }
            })
            .collect();

        match proxy {
            Some(proxy) => {
                for (name, bytes) in named {
                    self.decode(index, object, proxy, &name, bytes);
                }
            }
            None => {
                let mut ready = false;
                {
                    let converter = &self.objects[index].converter;
                    let mut catalogue = self.catalogue.lock();
                    for (name, bytes) in named {
                        if let Some(r) = catalogue.accumulate(object, &name, bytes.clone(), || {
                            converter.required_attributes()
                        }) {
                            ready = r;
                        }
                    }
                }
                if ready {
                    self.materialize(index, object);
                }
            }
        }
    }

    fn materialize(&mut self, index: usize, object: ObjectHandle) {
        let (instance_name, pending) = {
            let mut catalogue = self.catalogue.lock();
            let Some(instance_name) = catalogue.get(object).map(|r| r.instance_name.clone()) else {
                return;
            };
            let Some(pending) = catalogue.take_pending(object) else {
                return;
            };
            (instance_name, pending)
        };

        let model = Arc::clone(&self.ctx.model);
        let result = self.objects[index]
            .converter
            .materialize(&*model, &instance_name, &pending);

        let proxy = match result {
            Ok(Materialized::Created(proxy)) => {
                info!("Created ghost {} for {} '{}'", proxy, object, instance_name);
                self.catalogue
                    .lock()
                    .attach_proxy(object, proxy, ObjectState::Materialized);
                proxy
            }
            Ok(Materialized::Linked(proxy)) => {
                info!("Linked {} '{}' to local {}", object, instance_name, proxy);
                self.catalogue.lock().attach_proxy(object, proxy, ObjectState::Linked);
                self.linked.insert(proxy);
                proxy
            }
            Err(e) => {
                error!("Failed to materialize {} '{}': {}", object, instance_name, e);
                self.catalogue.lock().restore_pending(object, pending);
                return;
            }
        };

        for (name, bytes) in pending.attributes() {
            self.decode(index, object, proxy, name, bytes);
        }
    }

    fn decode(
        &mut self,
        index: usize,
        object: ObjectHandle,
        proxy: LocalObjectId,
        attribute: &str,
        bytes: &[u8],
    ) {
        let model = Arc::clone(&self.ctx.model);
        if let Err(e) = self.objects[index]
            .converter
            .decode_attribute(&*model, proxy, attribute, bytes)
        {
            warn!("Failed to decode {} of {}: {}", attribute, object, e);
        }
    }

    /// Removes a remote object. Returns false for unknown handles.
    pub fn process_remove(&mut self, object: ObjectHandle) -> bool {
        let Some(record) = self.catalogue.lock().remove(object) else {
            debug!("Dropping removal of unknown {}", object);
            return false;
        };
        self.liveness.forget(object);

        match (record.state, record.proxy) {
            (ObjectState::Linked, Some(proxy)) => {
                info!("Unlinking local {} from removed {}", proxy, object);
                self.linked.remove(&proxy);
                if let Err(e) = self.ctx.model.set_link_status(proxy, LinkStatus::Unlinked) {
                    warn!("Failed to unlink {}: {}", proxy, e);
                }
            }
            (ObjectState::Materialized, Some(proxy)) => {
                info!("Destroying ghost {} of removed {}", proxy, object);
                if let Err(e) = self.ctx.model.destroy_ghost(proxy) {
                    warn!("Failed to destroy ghost {}: {}", proxy, e);
                }
            }
            (state, _) => debug!("Removed {} from state {:?}", object, state),
        }
        true
    }

    /// Answers the RTI's request for current values of owned attributes.
    pub fn process_provide_attribute_update(
        &mut self,
        object: ObjectHandle,
        attributes: &BTreeSet<AttributeHandle>,
    ) {
        let (class, proxy) = {
            let catalogue = self.catalogue.lock();
            match catalogue.get(object) {
                Some(record) if record.state == ObjectState::TrackedLocal => {
                    (record.class, record.proxy)
                }
                Some(record) => {
                    debug!(
                        "Not the owner of {} ({:?}), ignoring update request",
                        object, record.state
                    );
                    return;
                }
                None => {
                    debug!("Dropping update request for unknown {}", object);
                    return;
                }
            }
        };
        let Some(proxy) = proxy else {
            debug!("No local object for {}, skipping update request", object);
            return;
        };
        let Some(index) = self.registration_for_class(class) else {
            return;
        };

        let mut encoded = EncodedAttributes::new();
        for handle in attributes {
            let name = match self.ctx.handles.attribute_name(class, *handle) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Skipping requested attribute of {}: {}", object, e);
                    continue;
                }
            };
            self.encode_into(index, proxy, &name, &mut encoded);
        }
        if !encoded.is_empty() {
            self.send_update(object, class, &encoded);
        }
    }

    pub fn process_receive_interaction(
        &mut self,
        class: InteractionClassHandle,
        parameters: &ParameterValues,
        _tag: &[u8],
    ) {
        let Some(reg) = self
            .interactions
            .iter()
            .find(|r| r.class == Some(class) && r.subscribe)
        else {
            debug!("Dropping interaction of {}: no subscribed converter", class);
            return;
        };

        let mut named = EncodedAttributes::new();
        for (handle, bytes) in parameters {
            match self.ctx.handles.parameter_name(class, *handle) {
                Ok(name) => {
                    named.insert(name, bytes.clone());
                }
                Err(e) => warn!("Skipping parameter of {}: {}", class, e),
            }
        }

        match reg.converter.decode(&named) {
            Ok(interaction) => {
                debug!("Delivering {} to local model", interaction.class);
                if let Err(e) = self.ctx.model.deliver_interaction(interaction) {
                    warn!("Local model refused interaction: {}", e);
                }
            }
            Err(e) => warn!("Failed to decode interaction {}: {}", reg.converter.fom_class(), e),
        }
    }

    // ========================================================================
    // OUTBOUND
    // ========================================================================

    /// Registers a newly created local object with the federation.
    pub fn process_local_create(&mut self, proxy: LocalObjectId) {
        let Some(odm_class) = self.ctx.model.class_of(proxy) else {
            warn!("Created object {} is unknown to the local model", proxy);
            return;
        };
        let Some(index) = self.registration_for_odm(&odm_class) else {
            debug!("No converter for local class {}", odm_class);
            return;
        };

        if self.ctx.model.link_status(proxy) == LinkStatus::Linked && !self.linked.contains(&proxy) {
            debug!("Resetting stale link of {}", proxy);
            if let Err(e) = self.ctx.model.set_link_status(proxy, LinkStatus::Unlinked) {
                warn!("Failed to unlink {}: {}", proxy, e);
            }
            return;
        }
        if self.catalogue.lock().handle_for_proxy(proxy).is_some() {
            debug!("{} is already known to the federation", proxy);
            return;
        }

        let reg = &self.objects[index];
        let Some(class) = reg.class.filter(|_| reg.publish) else {
            debug!("{} is not published, not registering {}", reg.converter.fom_class(), proxy);
            return;
        };

        let tag = self.tags.next_tag();
        match self.ctx.rti.submit(RtiRequest::RegisterObjectInstance {
            class,
            name: tag.clone(),
        }) {
            Ok(id) => {
                debug!("Registering {} as '{}'", proxy, tag);
                self.registrations.insert(
                    id,
                    PendingRegistration {
                        proxy,
                        registration: index,
                        tag,
                        deleted: false,
                    },
                );
            }
            Err(e) => {
                error!("Failed to register {}: {}", proxy, e);
                self.tags.release(&tag);
            }
        }
    }

    /// Claims the return of a registration request.
    ///
    /// Returns false for returns of requests this pipeline did not send.
    pub fn on_return(&mut self, ret: &RtiReturn) -> bool {
        let Some(pending) = self.registrations.remove(&ret.request) else {
            return false;
        };
        let handle = match &ret.outcome {
            Ok(ReturnValue::Object(handle)) => *handle,
            Ok(other) => {
                warn!("Unexpected registration return {:?} for {}", other, pending.proxy);
                self.tags.release(&pending.tag);
                return true;
            }
            Err(e) => {
                error!("Registration of {} failed: {}", pending.proxy, e);
                self.tags.release(&pending.tag);
                return true;
            }
        };

        let reg = &self.objects[pending.registration];
        let Some(class) = reg.class else {
            return true;
        };

        if pending.deleted {
            debug!("{} was deleted before registration completed", pending.proxy);
            self.tags.release(&pending.tag);
            send(
                &*self.ctx.rti,
                RtiRequest::DeleteObjectInstance {
                    object: handle,
                    tag: pending.tag.into_bytes(),
                },
            );
            return true;
        }

        let fom_class = reg.converter.fom_class().to_string();
        self.catalogue
            .lock()
            .track_local(handle, class, &fom_class, pending.proxy, &pending.tag);
        info!("Registered {} as {} '{}'", pending.proxy, handle, pending.tag);

        // Full update of everything published
        let mut encoded = EncodedAttributes::new();
        for attribute in self.objects[pending.registration].converter.publish_attributes() {
            self.encode_into(pending.registration, pending.proxy, &attribute, &mut encoded);
        }
        if !encoded.is_empty() {
            self.send_update(handle, class, &encoded);
        }
        true
    }

    /// Sends the attributes affected by changed local properties.
    pub fn process_property_change(&mut self, proxy: LocalObjectId, changed: &[String]) {
        let (object, class, state) = {
            let catalogue = self.catalogue.lock();
            let Some(record) = catalogue
                .handle_for_proxy(proxy)
                .and_then(|handle| catalogue.get(handle))
            else {
                debug!("Ignoring changes of unregistered {}", proxy);
                return;
            };
            (record.handle, record.class, record.state)
        };
        if state != ObjectState::TrackedLocal {
            return;
        }
        let Some(index) = self.registration_for_class(class) else {
            return;
        };

        let attributes: BTreeSet<String> = changed
            .iter()
            .flat_map(|property| self.objects[index].converter.attributes_for_property(property))
            .collect();

        let mut encoded = EncodedAttributes::new();
        for attribute in &attributes {
            self.encode_into(index, proxy, attribute, &mut encoded);
        }
        if encoded.is_empty() {
            return;
        }

        let model = Arc::clone(&self.ctx.model);
        let converter = &mut self.objects[index].converter;
        converter.finished_property_changes(&*model, proxy, &mut encoded);
        if !converter.should_send_update(proxy, &encoded) {
            debug!("Update of {} vetoed by converter", object);
            return;
        }
        self.send_update(object, class, &encoded);
    }

    /// Deletes a tracked local object from the federation.
    pub fn process_local_delete(&mut self, proxy: LocalObjectId) {
        let handle = self.catalogue.lock().handle_for_proxy(proxy);
        let Some(handle) = handle else {
            if let Some(pending) = self.registrations.values_mut().find(|p| p.proxy == proxy) {
                pending.deleted = true;
            } else {
                debug!("Ignoring deletion of unregistered {}", proxy);
            }
            return;
        };

        let record = {
            let mut catalogue = self.catalogue.lock();
            if catalogue.state(handle) != Some(ObjectState::TrackedLocal) {
                debug!("{} is not a tracked local object", proxy);
                return;
            }
            catalogue.remove(handle)
        };
        let Some(record) = record else {
            return;
        };
        self.liveness.forget(handle);

        let tag = record.tag.unwrap_or_default();
        info!("Deleting {} '{}'", handle, tag);
        send(
            &*self.ctx.rti,
            RtiRequest::DeleteObjectInstance {
                object: handle,
                tag: tag.clone().into_bytes(),
            },
        );
        self.tags.release(&tag);
    }

    pub fn process_local_interaction(&mut self, interaction: &LocalInteraction) {
        let Some(reg) = self
            .interactions
            .iter()
            .find(|r| r.converter.odm_class() == interaction.class)
        else {
            debug!("No converter for local interaction {}", interaction.class);
            return;
        };
        let Some(class) = reg.class.filter(|_| reg.publish) else {
            debug!("{} is not published", reg.converter.fom_class());
            return;
        };

        let encoded = match reg.converter.encode(interaction) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode interaction {}: {}", interaction.class, e);
                return;
            }
        };
        let mut parameters = ParameterValues::new();
        for (name, bytes) in encoded {
            match self.ctx.handles.parameter_handle(class, &name) {
                Ok(handle) => {
                    parameters.insert(handle, bytes);
                }
                Err(e) => warn!("Skipping parameter {}: {}", name, e),
            }
        }

        send(
            &*self.ctx.rti,
            RtiRequest::SendInteraction {
                class,
                parameters,
                tag: self.federate_name.clone().into_bytes(),
            },
        );
    }

    fn encode_into(
        &self,
        index: usize,
        proxy: LocalObjectId,
        attribute: &str,
        out: &mut EncodedAttributes,
    ) {
        match self.objects[index]
            .converter
            .encode_attribute(&*self.ctx.model, proxy, attribute)
        {
            Ok(Some(bytes)) => {
                out.insert(attribute.to_string(), bytes);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to encode {} of {}: {}", attribute, proxy, e),
        }
    }

    fn send_update(&mut self, object: ObjectHandle, class: ObjectClassHandle, encoded: &EncodedAttributes) {
        let mut attributes = AttributeValues::new();
        for (name, bytes) in encoded {
            match self.ctx.handles.attribute_handle(class, name) {
                Ok(handle) => {
                    attributes.insert(handle, bytes.clone());
                }
                Err(e) => warn!("Skipping attribute {} of {}: {}", name, object, e),
            }
        }
        if attributes.is_empty() {
            return;
        }

        self.liveness.record_outbound(object, &attributes, self.now);
        send(
            &*self.ctx.rti,
            RtiRequest::UpdateAttributeValues {
                object,
                attributes,
                tag: self.federate_name.clone().into_bytes(),
            },
        );
    }

    // ========================================================================
    // LIVENESS
    // ========================================================================

    /// Advances the liveness clock: re-sends heartbeats, drops silent objects.
    pub fn tick(&mut self, now: i64) {
        self.now = now;

        for (object, attributes) in self.liveness.due_heartbeats(now) {
            debug!("Heartbeat for {}", object);
            send(
                &*self.ctx.rti,
                RtiRequest::UpdateAttributeValues {
                    object,
                    attributes,
                    tag: self.federate_name.clone().into_bytes(),
                },
            );
        }

        for object in self.liveness.expired(now) {
            info!("{} timed out", object);
            self.process_remove(object);
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn catalogue(&self) -> &SharedCatalogue {
        &self.catalogue
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    pub fn is_object_published(&self, fom_class: &str) -> bool {
        self.objects
            .iter()
            .any(|r| r.publish && r.converter.fom_class() == fom_class)
    }

    pub fn is_object_subscribed(&self, fom_class: &str) -> bool {
        self.objects
            .iter()
            .any(|r| r.subscribe && r.converter.fom_class() == fom_class)
    }

    pub fn pending_registrations(&self) -> usize {
        self.registrations.len()
    }

    fn registration_for_class(&self, class: ObjectClassHandle) -> Option<usize> {
        self.objects.iter().position(|r| r.class == Some(class))
    }

    fn subscribed_registration(&self, class: ObjectClassHandle) -> Option<usize> {
        self.objects
            .iter()
            .position(|r| r.class == Some(class) && r.subscribe)
    }

    fn registration_for_odm(&self, odm_class: &str) -> Option<usize> {
        self.objects
            .iter()
            .position(|r| r.converter.odm_class() == odm_class)
    }
}

fn resolve_attributes(
    handles: &dyn HandleResolver,
    class: ObjectClassHandle,
    names: &BTreeSet<String>,
) -> BTreeSet<AttributeHandle> {
    names
        .iter()
        .filter_map(|name| match handles.attribute_handle(class, name) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Skipping attribute {}: {}", name, e);
                None
            }
        })
        .collect()
}

/// Sends a request, logging refusal. Returns whether it was accepted.
fn send(rti: &dyn RtiAmbassador, request: RtiRequest) -> bool {
    let name = request.name();
    match rti.submit(request) {
        Ok(_) => true,
        Err(e) => {
            warn!("Failed to send {}: {}", name, e);
            false
        }
    }
}
