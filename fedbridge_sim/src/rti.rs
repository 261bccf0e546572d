//! In-process RTI shared by the federates of one simulated federation.
//!
//! Every federate talks to the RTI through its own `SimRtiPort`. Requests
//! are processed synchronously under one lock; the single `RequestReturn`
//! and any callbacks they cause are queued in the inboxes of the affected
//! ports and handed to the federates when the harness polls them.
//!
//! Time management is conservative: a constrained federate's TAR to `t` is
//! granted once `t` does not exceed the output bound of every other
//! regulating federate (its pending TAR or logical time, plus lookahead).

use fedbridge_env::{
    AttributeHandle, AttributeValues, EnvError, FederateHandle, HandleResolver,
    InteractionClassHandle, ObjectClassHandle, ObjectHandle, ParameterHandle, ParameterValues,
    RequestId, ResignAction, ReturnValue, RtiAmbassador, RtiCallback, RtiException, RtiRequest,
    RtiReturn,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Index of a connection to the simulated RTI.
pub type PortId = usize;

/// Traffic counters of a simulated RTI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RtiStats {
    /// Requests accepted
    pub requests: u64,
    /// Requests refused at submit time
    pub refused: u64,
    /// Callbacks queued, returns included
    pub callbacks: u64,
    /// Reflections routed to subscribers
    pub reflections: u64,
    /// Interactions routed to subscribers
    pub interactions: u64,
    /// Time advance grants issued
    pub grants: u64,
}

// ============================================================================
// HANDLE REGISTRY
// ============================================================================

/// Open FOM: names get handles on first lookup.
#[derive(Debug, Default)]
struct HandleRegistry {
    object_classes: BTreeMap<String, ObjectClassHandle>,
    attributes: BTreeMap<(ObjectClassHandle, String), AttributeHandle>,
    interaction_classes: BTreeMap<String, InteractionClassHandle>,
    parameters: BTreeMap<(InteractionClassHandle, String), ParameterHandle>,
}

impl HandleRegistry {
    fn object_class(&mut self, name: &str) -> ObjectClassHandle {
        let next = ObjectClassHandle(self.object_classes.len() as u32 + 1);
        *self.object_classes.entry(name.to_string()).or_insert(next)
    }

    fn attribute(&mut self, class: ObjectClassHandle, name: &str) -> Result<AttributeHandle, EnvError> {
        if !self.object_classes.values().any(|c| *c == class) {
            return Err(EnvError::handle(class));
        }
        let next = AttributeHandle(self.attributes.len() as u32 + 1);
        Ok(*self
            .attributes
            .entry((class, name.to_string()))
            .or_insert(next))
    }

    fn attribute_name(&self, class: ObjectClassHandle, handle: AttributeHandle) -> Result<String, EnvError> {
        self.attributes
            .iter()
            .find(|((c, _), h)| *c == class && **h == handle)
            .map(|((_, name), _)| name.clone())
            .ok_or_else(|| EnvError::handle(handle))
    }

    fn interaction_class(&mut self, name: &str) -> InteractionClassHandle {
        let next = InteractionClassHandle(self.interaction_classes.len() as u32 + 1);
        *self
            .interaction_classes
            .entry(name.to_string())
            .or_insert(next)
    }

    fn parameter(
        &mut self,
        class: InteractionClassHandle,
        name: &str,
    ) -> Result<ParameterHandle, EnvError> {
        if !self.interaction_classes.values().any(|c| *c == class) {
            return Err(EnvError::handle(class));
        }
        let next = ParameterHandle(self.parameters.len() as u32 + 1);
        Ok(*self
            .parameters
            .entry((class, name.to_string()))
            .or_insert(next))
    }

    fn parameter_name(
        &self,
        class: InteractionClassHandle,
        handle: ParameterHandle,
    ) -> Result<String, EnvError> {
        self.parameters
            .iter()
            .find(|((c, _), h)| *c == class && **h == handle)
            .map(|((_, name), _)| name.clone())
            .ok_or_else(|| EnvError::handle(handle))
    }
}

// ============================================================================
// FEDERATION STATE
// ============================================================================

#[derive(Debug)]
struct Member {
    handle: FederateHandle,
    name: String,
    constrained: bool,
    regulating: bool,
    lookahead: f64,
    logical_time: f64,
    pending_tar: Option<f64>,
    published_objects: BTreeSet<ObjectClassHandle>,
    subscribed_objects: BTreeMap<ObjectClassHandle, BTreeSet<AttributeHandle>>,
    published_interactions: BTreeSet<InteractionClassHandle>,
    subscribed_interactions: BTreeSet<InteractionClassHandle>,
}

impl Member {
    fn new(handle: FederateHandle, name: &str) -> Self {
        Self {
            handle,
            name: name.to_string(),
            constrained: false,
            regulating: false,
            lookahead: 0.0,
            logical_time: 0.0,
            pending_tar: None,
            published_objects: BTreeSet::new(),
            subscribed_objects: BTreeMap::new(),
            published_interactions: BTreeSet::new(),
            subscribed_interactions: BTreeSet::new(),
        }
    }

    /// Earliest time this member may still send messages for.
    fn output_bound(&self) -> f64 {
        self.pending_tar.unwrap_or(self.logical_time) + self.lookahead
    }
}

#[derive(Debug)]
struct SimObject {
    class: ObjectClassHandle,
    name: String,
    owner: Option<PortId>,
    known_by: BTreeSet<PortId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeKind {
    Save,
    Restore,
}

#[derive(Debug)]
struct Handshake {
    kind: HandshakeKind,
    label: String,
    reported: BTreeMap<PortId, bool>,
}

#[derive(Debug)]
struct Federation {
    name: String,
    members: BTreeMap<PortId, Member>,
    next_handle: u32,
}

type Outbox = Vec<(PortId, RtiCallback)>;

#[derive(Debug, Default)]
struct RtiState {
    federation: Option<Federation>,
    registry: HandleRegistry,
    objects: BTreeMap<ObjectHandle, SimObject>,
    next_object: u32,
    next_request: u64,
    handshake: Option<Handshake>,
    saved_labels: BTreeSet<String>,
    inboxes: Vec<VecDeque<RtiCallback>>,
    connected: Vec<bool>,
    stats: RtiStats,
}

impl RtiState {
    fn deliver(&mut self, port: PortId, callback: RtiCallback) {
        if let Some(inbox) = self.inboxes.get_mut(port) {
            self.stats.callbacks += 1;
            inbox.push_back(callback);
        }
    }

    fn members(&self) -> Result<&BTreeMap<PortId, Member>, RtiException> {
        self.federation
            .as_ref()
            .map(|f| &f.members)
            .ok_or(RtiException::FederationExecutionDoesNotExist)
    }

    fn member_mut(&mut self, port: PortId) -> Result<&mut Member, RtiException> {
        self.federation
            .as_mut()
            .ok_or(RtiException::FederationExecutionDoesNotExist)?
            .members
            .get_mut(&port)
            .ok_or(RtiException::FederateNotExecutionMember)
    }

    fn process(
        &mut self,
        port: PortId,
        request: &RtiRequest,
        out: &mut Outbox,
    ) -> Result<ReturnValue, RtiException> {
        match request {
            RtiRequest::CreateFederationExecution { federation, .. } => {
                if self.federation.is_some() {
                    return Err(RtiException::FederationExecutionAlreadyExists);
                }
                info!("Federation {} created", federation);
                self.federation = Some(Federation {
                    name: federation.clone(),
                    members: BTreeMap::new(),
                    next_handle: 0,
                });
                Ok(ReturnValue::Empty)
            }
            RtiRequest::DestroyFederationExecution { .. } => {
                if !self.members()?.is_empty() {
                    return Err(RtiException::FederatesCurrentlyJoined);
                }
                self.federation = None;
                self.objects.clear();
                self.handshake = None;
                info!("Federation destroyed");
                Ok(ReturnValue::Empty)
            }
            RtiRequest::JoinFederationExecution {
                federation,
                federate_name,
            } => {
                let fed = self
                    .federation
                    .as_mut()
                    .filter(|f| f.name == *federation)
                    .ok_or(RtiException::FederationExecutionDoesNotExist)?;
                if fed.members.contains_key(&port) {
                    return Err(RtiException::FederateAlreadyExecutionMember);
                }
                fed.next_handle += 1;
                let handle = FederateHandle(fed.next_handle);
                fed.members.insert(port, Member::new(handle, federate_name));
                info!("{} joined {} as {}", federate_name, federation, handle);
                Ok(ReturnValue::Federate(handle))
            }
            RtiRequest::ResignFederationExecution { action } => self.resign(port, *action, out),
            _ => self.process_member(port, request, out),
        }
    }

    fn process_member(
        &mut self,
        port: PortId,
        request: &RtiRequest,
        out: &mut Outbox,
    ) -> Result<ReturnValue, RtiException> {
        let member = self.member_mut(port)?;
        match request {
            // ---------------------------------------------------------------
            // Time
            // ---------------------------------------------------------------
            RtiRequest::EnableTimeConstrained => {
                member.constrained = true;
                out.push((port, RtiCallback::TimeConstrainedEnabled { time: member.logical_time }));
                self.try_grants(out);
            }
            RtiRequest::EnableTimeRegulation {
                federate_time,
                lookahead,
            } => {
                member.regulating = true;
                member.logical_time = *federate_time;
                member.lookahead = *lookahead;
                out.push((port, RtiCallback::TimeRegulationEnabled { time: *federate_time }));
                self.try_grants(out);
            }
            RtiRequest::TimeAdvanceRequest { time } => {
                if member.pending_tar.is_some() {
                    return Err(RtiException::TimeAdvanceAlreadyInProgress);
                }
                debug!("{} requests advance to {}", member.name, time);
                member.pending_tar = Some(*time);
                self.try_grants(out);
            }

            // ---------------------------------------------------------------
            // Declarations
            // ---------------------------------------------------------------
            RtiRequest::PublishObjectClass { class, .. } => {
                member.published_objects.insert(*class);
            }
            RtiRequest::SubscribeObjectClassAttributes { class, attributes } => {
                member.subscribed_objects.insert(*class, attributes.clone());
                self.discover_existing(port, *class, attributes, out);
            }
            RtiRequest::PublishInteractionClass { class } => {
                member.published_interactions.insert(*class);
            }
            RtiRequest::SubscribeInteractionClass { class } => {
                member.subscribed_interactions.insert(*class);
            }

            // ---------------------------------------------------------------
            // Objects and interactions
            // ---------------------------------------------------------------
            RtiRequest::RegisterObjectInstance { class, name } => {
                if !member.published_objects.contains(class) {
                    return Err(RtiException::ObjectClassNotPublished);
                }
                return self.register(port, *class, name, out);
            }
            RtiRequest::UpdateAttributeValues {
                object,
                attributes,
                tag,
            } => self.update(port, *object, attributes, tag, out)?,
            RtiRequest::DeleteObjectInstance { object, tag } => {
                self.delete(port, *object, tag, out)?
            }
            RtiRequest::SendInteraction {
                class,
                parameters,
                tag,
            } => {
                if !member.published_interactions.contains(class) {
                    return Err(RtiException::Internal(format!(
                        "{} is not published",
                        class
                    )));
                }
                self.route_interaction(port, *class, parameters, tag, out)?;
            }

            // ---------------------------------------------------------------
            // Save / restore
            // ---------------------------------------------------------------
            RtiRequest::FederateSaveBegun => {
                self.handshake_label(HandshakeKind::Save)
                    .ok_or(RtiException::SaveNotInitiated)?;
            }
            RtiRequest::FederateSaveComplete => self.report(port, HandshakeKind::Save, true, out)?,
            RtiRequest::FederateSaveNotComplete => {
                self.report(port, HandshakeKind::Save, false, out)?
            }
            RtiRequest::FederateRestoreComplete => {
                self.report(port, HandshakeKind::Restore, true, out)?
            }
            RtiRequest::FederateRestoreNotComplete => {
                self.report(port, HandshakeKind::Restore, false, out)?
            }

            RtiRequest::CreateFederationExecution { .. }
            | RtiRequest::DestroyFederationExecution { .. }
            | RtiRequest::JoinFederationExecution { .. }
            | RtiRequest::ResignFederationExecution { .. } => {
                return Err(RtiException::Internal(format!(
                    "{} routed as member request",
                    request.name()
                )))
            }
        }
        Ok(ReturnValue::Empty)
    }

    // ========================================================================
    // TIME
    // ========================================================================

    fn try_grants(&mut self, out: &mut Outbox) {
        let Some(fed) = self.federation.as_mut() else {
            return;
        };
        loop {
            let grantable: Vec<(PortId, f64)> = fed
                .members
                .iter()
                .filter_map(|(port, m)| {
                    let requested = m.pending_tar?;
                    let bound = fed
                        .members
                        .iter()
                        .filter(|(other, o)| *other != port && o.regulating)
                        .map(|(_, o)| o.output_bound())
                        .fold(f64::INFINITY, f64::min);
                    (!m.constrained || requested <= bound).then_some((*port, requested))
                })
                .collect();
            if grantable.is_empty() {
                return;
            }
            for (port, time) in grantable {
                if let Some(member) = fed.members.get_mut(&port) {
                    member.pending_tar = None;
                    member.logical_time = time;
                    debug!("Granting {} to {}", time, member.name);
                }
                self.stats.grants += 1;
                out.push((port, RtiCallback::TimeAdvanceGrant { time }));
            }
        }
    }

    // ========================================================================
    // OBJECTS
    // ========================================================================

    fn subscribers(&self, class: ObjectClassHandle, except: PortId) -> Vec<PortId> {
        self.members()
            .map(|members| {
                members
                    .iter()
                    .filter(|(port, m)| **port != except && m.subscribed_objects.contains_key(&class))
                    .map(|(port, _)| *port)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn register(
        &mut self,
        port: PortId,
        class: ObjectClassHandle,
        name: &str,
        out: &mut Outbox,
    ) -> Result<ReturnValue, RtiException> {
        if self.objects.values().any(|o| o.name == name) {
            return Err(RtiException::Internal(format!("object name '{}' in use", name)));
        }
        self.next_object += 1;
        let object = ObjectHandle(self.next_object);
        let known_by: BTreeSet<PortId> = self.subscribers(class, port).into_iter().collect();
        for subscriber in &known_by {
            out.push((
                *subscriber,
                RtiCallback::DiscoverObjectInstance {
                    object,
                    class,
                    name: name.to_string(),
                },
            ));
        }
        debug!("Registered {} '{}' for port {}", object, name, port);
        self.objects.insert(
            object,
            SimObject {
                class,
                name: name.to_string(),
                owner: Some(port),
                known_by,
            },
        );
        Ok(ReturnValue::Object(object))
    }

    /// Introduces objects registered before `port` subscribed to `class`,
    /// and asks their owners for current values.
    fn discover_existing(
        &mut self,
        port: PortId,
        class: ObjectClassHandle,
        attributes: &BTreeSet<AttributeHandle>,
        out: &mut Outbox,
    ) {
        for (handle, object) in self.objects.iter_mut() {
            if object.class != class || object.owner == Some(port) || !object.known_by.insert(port) {
                continue;
            }
            out.push((
                port,
                RtiCallback::DiscoverObjectInstance {
                    object: *handle,
                    class,
                    name: object.name.clone(),
                },
            ));
            if let Some(owner) = object.owner {
                out.push((
                    owner,
                    RtiCallback::ProvideAttributeValueUpdate {
                        object: *handle,
                        attributes: attributes.clone(),
                    },
                ));
            }
        }
    }

    fn owned(&self, port: PortId, object: ObjectHandle) -> Result<&SimObject, RtiException> {
        let record = self.objects.get(&object).ok_or(RtiException::ObjectNotKnown)?;
        if record.owner != Some(port) {
            return Err(RtiException::Internal(format!("{} is not owned by the sender", object)));
        }
        Ok(record)
    }

    fn update(
        &mut self,
        port: PortId,
        object: ObjectHandle,
        attributes: &AttributeValues,
        tag: &[u8],
        out: &mut Outbox,
    ) -> Result<(), RtiException> {
        let record = self.owned(port, object)?;
        let members = self.members()?;
        let mut routed = 0;
        for subscriber in &record.known_by {
            let Some(subscribed) = members
                .get(subscriber)
                .and_then(|m| m.subscribed_objects.get(&record.class))
            else {
                continue;
            };
            let filtered: AttributeValues = attributes
                .iter()
                .filter(|(handle, _)| subscribed.contains(handle))
                .map(|(handle, bytes)| (*handle, bytes.clone()))
                .collect();
            if filtered.is_empty() {
                continue;
            }
            routed += 1;
            out.push((
                *subscriber,
                RtiCallback::ReflectAttributeValues {
                    object,
                    attributes: filtered,
                    tag: tag.to_vec(),
                },
            ));
        }
        self.stats.reflections += routed;
        Ok(())
    }

    fn delete(
        &mut self,
        port: PortId,
        object: ObjectHandle,
        tag: &[u8],
        out: &mut Outbox,
    ) -> Result<(), RtiException> {
        self.owned(port, object)?;
        self.remove_object(object, tag, out);
        Ok(())
    }

    fn remove_object(&mut self, object: ObjectHandle, tag: &[u8], out: &mut Outbox) {
        let Some(record) = self.objects.remove(&object) else {
            return;
        };
        debug!("Removing {} '{}'", object, record.name);
        for port in record.known_by {
            out.push((
                port,
                RtiCallback::RemoveObjectInstance {
                    object,
                    tag: tag.to_vec(),
                },
            ));
        }
    }

    fn route_interaction(
        &mut self,
        port: PortId,
        class: InteractionClassHandle,
        parameters: &ParameterValues,
        tag: &[u8],
        out: &mut Outbox,
    ) -> Result<(), RtiException> {
        let receivers: Vec<PortId> = self
            .members()?
            .iter()
            .filter(|(p, m)| **p != port && m.subscribed_interactions.contains(&class))
            .map(|(p, _)| *p)
            .collect();
        self.stats.interactions += receivers.len() as u64;
        for receiver in receivers {
            out.push((
                receiver,
                RtiCallback::ReceiveInteraction {
                    class,
                    parameters: parameters.clone(),
                    tag: tag.to_vec(),
                },
            ));
        }
        Ok(())
    }

    fn resign(
        &mut self,
        port: PortId,
        action: ResignAction,
        out: &mut Outbox,
    ) -> Result<ReturnValue, RtiException> {
        let member = self
            .federation
            .as_mut()
            .ok_or(RtiException::FederationExecutionDoesNotExist)?
            .members
            .remove(&port)
            .ok_or(RtiException::FederateNotExecutionMember)?;
        info!("{} resigned ({})", member.name, action);

        let owned: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|(_, o)| o.owner == Some(port))
            .map(|(handle, _)| *handle)
            .collect();
        let deletes = matches!(
            action,
            ResignAction::DeleteObjects | ResignAction::DeleteObjectsAndReleaseAttributes
        );
        for handle in owned {
            if deletes {
                self.remove_object(handle, member.name.as_bytes(), out);
            } else if let Some(object) = self.objects.get_mut(&handle) {
                object.owner = None;
            }
        }
        for object in self.objects.values_mut() {
            object.known_by.remove(&port);
        }

        if let Some(handshake) = self.handshake.as_mut() {
            handshake.reported.remove(&port);
        }
        self.finish_handshake(out);
        self.try_grants(out);
        Ok(ReturnValue::Empty)
    }

    // ========================================================================
    // SAVE / RESTORE
    // ========================================================================

    fn handshake_label(&self, kind: HandshakeKind) -> Option<&str> {
        self.handshake
            .as_ref()
            .filter(|h| h.kind == kind)
            .map(|h| h.label.as_str())
    }

    fn report(
        &mut self,
        port: PortId,
        kind: HandshakeKind,
        complete: bool,
        out: &mut Outbox,
    ) -> Result<(), RtiException> {
        let handshake = self
            .handshake
            .as_mut()
            .filter(|h| h.kind == kind)
            .ok_or(match kind {
                HandshakeKind::Save => RtiException::SaveNotInitiated,
                HandshakeKind::Restore => RtiException::RestoreNotRequested,
            })?;
        handshake.reported.insert(port, complete);
        self.finish_handshake(out);
        Ok(())
    }

    /// Ends the running handshake once every member reported.
    fn finish_handshake(&mut self, out: &mut Outbox) {
        let Some(handshake) = self.handshake.as_ref() else {
            return;
        };
        let Ok(members) = self.members() else {
            return;
        };
        if members.keys().any(|port| !handshake.reported.contains_key(port)) {
            return;
        }
        let success = handshake.reported.values().all(|ok| *ok);
        let callback = match (handshake.kind, success) {
            (HandshakeKind::Save, true) => RtiCallback::FederationSaved,
            (HandshakeKind::Save, false) => RtiCallback::FederationNotSaved,
            (HandshakeKind::Restore, true) => RtiCallback::FederationRestored,
            (HandshakeKind::Restore, false) => RtiCallback::FederationNotRestored,
        };
        info!("Handshake for '{}' finished: {:?}", handshake.label, callback);
        let ports: Vec<PortId> = members.keys().copied().collect();
        if handshake.kind == HandshakeKind::Save && success {
            self.saved_labels.insert(handshake.label.clone());
        }
        self.handshake = None;
        for port in ports {
            out.push((port, callback.clone()));
        }
    }
}

// ============================================================================
// SIMULATED RTI
// ============================================================================

/// The simulated RTI.
#[derive(Debug, Default)]
pub struct SimRti {
    state: Mutex<RtiState>,
}

impl SimRti {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opens a new connection.
    pub fn connect(self: &Arc<Self>) -> Arc<SimRtiPort> {
        let mut state = self.state.lock();
        let port = state.inboxes.len();
        state.inboxes.push(VecDeque::new());
        state.connected.push(true);
        Arc::new(SimRtiPort {
            rti: Arc::clone(self),
            port,
        })
    }

    fn submit(&self, port: PortId, request: RtiRequest) -> Result<RequestId, EnvError> {
        let mut state = self.state.lock();
        if !state.connected.get(port).copied().unwrap_or(false) {
            state.stats.refused += 1;
            return Err(EnvError::rti(format!(
                "port {} disconnected, {} not sent",
                port,
                request.name()
            )));
        }
        state.next_request += 1;
        state.stats.requests += 1;
        let id = RequestId(state.next_request);

        let mut out = Outbox::new();
        let outcome = state.process(port, &request, &mut out);
        if let Err(e) = &outcome {
            debug!("{} from port {} failed: {}", request.name(), port, e);
        }

        state.deliver(port, RtiCallback::RequestReturn(RtiReturn { request: id, outcome }));
        for (to, callback) in out {
            state.deliver(to, callback);
        }
        Ok(id)
    }

    /// Asks every member to save under `label`.
    pub fn request_federation_save(&self, label: &str) -> Result<(), EnvError> {
        self.start_handshake(HandshakeKind::Save, label)
    }

    /// Asks every member to restore the federation save `label`.
    pub fn request_federation_restore(&self, label: &str) -> Result<(), EnvError> {
        self.start_handshake(HandshakeKind::Restore, label)
    }

    fn start_handshake(&self, kind: HandshakeKind, label: &str) -> Result<(), EnvError> {
        let mut state = self.state.lock();
        if let Some(running) = &state.handshake {
            return Err(EnvError::rti(format!(
                "handshake for '{}' still running",
                running.label
            )));
        }
        if kind == HandshakeKind::Restore && !state.saved_labels.contains(label) {
            return Err(EnvError::rti(format!("no federation save labelled '{}'", label)));
        }
        let members: Vec<(PortId, FederateHandle)> = state
            .members()
            .map_err(|e| EnvError::rti(e.to_string()))?
            .iter()
            .map(|(port, m)| (*port, m.handle))
            .collect();
        if members.is_empty() {
            return Err(EnvError::rti("no federates joined"));
        }

        state.handshake = Some(Handshake {
            kind,
            label: label.to_string(),
            reported: BTreeMap::new(),
        });
        match kind {
            HandshakeKind::Save => {
                info!("Federation save '{}' requested", label);
                for (port, _) in &members {
                    state.deliver(
                        *port,
                        RtiCallback::InitiateFederateSave {
                            label: label.to_string(),
                        },
                    );
                }
            }
            HandshakeKind::Restore => {
                info!("Federation restore '{}' requested", label);
                for (port, _) in &members {
                    state.deliver(*port, RtiCallback::FederationRestoreBegun);
                }
                for (port, federate) in members {
                    state.deliver(
                        port,
                        RtiCallback::InitiateFederateRestore {
                            label: label.to_string(),
                            federate,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub fn stats(&self) -> RtiStats {
        self.state.lock().stats
    }

    pub fn federation_exists(&self) -> bool {
        self.state.lock().federation.is_some()
    }

    pub fn member_count(&self) -> usize {
        self.state.lock().members().map_or(0, |m| m.len())
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Names of the registered objects.
    pub fn object_names(&self) -> BTreeSet<String> {
        self.state
            .lock()
            .objects
            .values()
            .map(|o| o.name.clone())
            .collect()
    }

    /// Logical time of the member behind `port`.
    pub fn logical_time(&self, port: PortId) -> Option<f64> {
        self.state
            .lock()
            .members()
            .ok()?
            .get(&port)
            .map(|m| m.logical_time)
    }

    pub fn saved_labels(&self) -> BTreeSet<String> {
        self.state.lock().saved_labels.clone()
    }

    pub fn handshake_running(&self) -> bool {
        self.state.lock().handshake.is_some()
    }
}

// ============================================================================
// PORT
// ============================================================================

/// One federate's connection to the simulated RTI.
#[derive(Debug)]
pub struct SimRtiPort {
    rti: Arc<SimRti>,
    port: PortId,
}

impl SimRtiPort {
    pub fn id(&self) -> PortId {
        self.port
    }

    /// Takes the oldest queued callback.
    pub fn poll(&self) -> Option<RtiCallback> {
        self.rti
            .state
            .lock()
            .inboxes
            .get_mut(self.port)
            .and_then(|inbox| inbox.pop_front())
    }

    pub fn pending(&self) -> usize {
        self.rti
            .state
            .lock()
            .inboxes
            .get(self.port)
            .map_or(0, |inbox| inbox.len())
    }

    /// A disconnected port refuses every submit.
    pub fn set_connected(&self, connected: bool) {
        let mut state = self.rti.state.lock();
        if let Some(flag) = state.connected.get_mut(self.port) {
            if !connected {
                warn!("Port {} disconnected", self.port);
            }
            *flag = connected;
        }
    }
}

impl RtiAmbassador for SimRtiPort {
    fn submit(&self, request: RtiRequest) -> Result<RequestId, EnvError> {
        self.rti.submit(self.port, request)
    }
}

impl HandleResolver for SimRtiPort {
    fn object_class_handle(&self, class: &str) -> Result<ObjectClassHandle, EnvError> {
        Ok(self.rti.state.lock().registry.object_class(class))
    }

    fn attribute_handle(
        &self,
        class: ObjectClassHandle,
        attribute: &str,
    ) -> Result<AttributeHandle, EnvError> {
        self.rti.state.lock().registry.attribute(class, attribute)
    }

    fn attribute_name(
        &self,
        class: ObjectClassHandle,
        attribute: AttributeHandle,
    ) -> Result<String, EnvError> {
        self.rti.state.lock().registry.attribute_name(class, attribute)
    }

    fn interaction_class_handle(&self, class: &str) -> Result<InteractionClassHandle, EnvError> {
        Ok(self.rti.state.lock().registry.interaction_class(class))
    }

    fn parameter_handle(
        &self,
        class: InteractionClassHandle,
        parameter: &str,
    ) -> Result<ParameterHandle, EnvError> {
        self.rti.state.lock().registry.parameter(class, parameter)
    }

    fn parameter_name(
        &self,
        class: InteractionClassHandle,
        parameter: ParameterHandle,
    ) -> Result<String, EnvError> {
        self.rti.state.lock().registry.parameter_name(class, parameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(port: &SimRtiPort) -> Vec<RtiCallback> {
        std::iter::from_fn(|| port.poll()).collect()
    }

    fn joined_pair() -> (Arc<SimRti>, Arc<SimRtiPort>, Arc<SimRtiPort>) {
        let rti = SimRti::new();
        let a = rti.connect();
        let b = rti.connect();
        a.submit(RtiRequest::CreateFederationExecution {
            federation: "Fed".into(),
            fom_path: "fom.fed".into(),
        })
        .unwrap();
        for (port, name) in [(&a, "alpha"), (&b, "bravo")] {
            port.submit(RtiRequest::JoinFederationExecution {
                federation: "Fed".into(),
                federate_name: name.into(),
            })
            .unwrap();
        }
        drain(&a);
        drain(&b);
        (rti, a, b)
    }

    fn outcome(callbacks: &[RtiCallback], id: RequestId) -> Result<ReturnValue, RtiException> {
        callbacks
            .iter()
            .find_map(|cb| match cb {
                RtiCallback::RequestReturn(ret) if ret.request == id => Some(ret.outcome.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_every_request_gets_one_return() {
        let rti = SimRti::new();
        let port = rti.connect();
        let create = port
            .submit(RtiRequest::CreateFederationExecution {
                federation: "Fed".into(),
                fom_path: String::new(),
            })
            .unwrap();
        let again = port
            .submit(RtiRequest::CreateFederationExecution {
                federation: "Fed".into(),
                fom_path: String::new(),
            })
            .unwrap();

        let callbacks = drain(&port);
        assert_eq!(callbacks.len(), 2);
        assert_eq!(outcome(&callbacks, create), Ok(ReturnValue::Empty));
        assert_eq!(
            outcome(&callbacks, again),
            Err(RtiException::FederationExecutionAlreadyExists)
        );
    }

    #[test]
    fn test_join_assigns_distinct_handles() {
        let rti = SimRti::new();
        let a = rti.connect();
        let b = rti.connect();
        a.submit(RtiRequest::CreateFederationExecution {
            federation: "Fed".into(),
            fom_path: String::new(),
        })
        .unwrap();
        let ja = a
            .submit(RtiRequest::JoinFederationExecution {
                federation: "Fed".into(),
                federate_name: "alpha".into(),
            })
            .unwrap();
        let jb = b
            .submit(RtiRequest::JoinFederationExecution {
                federation: "Fed".into(),
                federate_name: "bravo".into(),
            })
            .unwrap();

        assert_eq!(
            outcome(&drain(&a), ja),
            Ok(ReturnValue::Federate(FederateHandle(1)))
        );
        assert_eq!(
            outcome(&drain(&b), jb),
            Ok(ReturnValue::Federate(FederateHandle(2)))
        );
        assert_eq!(rti.member_count(), 2);
    }

    #[test]
    fn test_non_member_requests_fail() {
        let rti = SimRti::new();
        let port = rti.connect();
        let id = port.submit(RtiRequest::EnableTimeConstrained).unwrap();
        assert_eq!(
            outcome(&drain(&port), id),
            Err(RtiException::FederationExecutionDoesNotExist)
        );
    }

    #[test]
    fn test_registration_discovered_and_reflected() {
        let (rti, a, b) = joined_pair();
        let class = a.object_class_handle("Platform").unwrap();
        let speed = a.attribute_handle(class, "Speed").unwrap();
        a.submit(RtiRequest::PublishObjectClass {
            class,
            attributes: [speed].into(),
        })
        .unwrap();
        b.submit(RtiRequest::SubscribeObjectClassAttributes {
            class,
            attributes: [speed].into(),
        })
        .unwrap();

        let register = a
            .submit(RtiRequest::RegisterObjectInstance {
                class,
                name: "alpha-1".into(),
            })
            .unwrap();
        let Ok(ReturnValue::Object(object)) = outcome(&drain(&a), register) else {
            panic!("registration failed");
        };
        a.submit(RtiRequest::UpdateAttributeValues {
            object,
            attributes: [(speed, vec![1, 2, 3, 4])].into(),
            tag: b"alpha".to_vec(),
        })
        .unwrap();

        let seen: Vec<RtiCallback> = drain(&b)
            .into_iter()
            .filter(|cb| !matches!(cb, RtiCallback::RequestReturn(_)))
            .collect();
        assert_eq!(
            seen,
            vec![
                RtiCallback::DiscoverObjectInstance {
                    object,
                    class,
                    name: "alpha-1".into()
                },
                RtiCallback::ReflectAttributeValues {
                    object,
                    attributes: [(speed, vec![1, 2, 3, 4])].into(),
                    tag: b"alpha".to_vec(),
                },
            ]
        );
        assert_eq!(rti.stats().reflections, 1);
    }

    #[test]
    fn test_register_requires_publication() {
        let (_rti, a, _b) = joined_pair();
        let class = a.object_class_handle("Platform").unwrap();
        let id = a
            .submit(RtiRequest::RegisterObjectInstance {
                class,
                name: "x".into(),
            })
            .unwrap();
        assert_eq!(
            outcome(&drain(&a), id),
            Err(RtiException::ObjectClassNotPublished)
        );
    }

    #[test]
    fn test_late_subscriber_discovers_and_owner_is_asked() {
        let (_rti, a, b) = joined_pair();
        let class = a.object_class_handle("Platform").unwrap();
        let speed = a.attribute_handle(class, "Speed").unwrap();
        a.submit(RtiRequest::PublishObjectClass {
            class,
            attributes: [speed].into(),
        })
        .unwrap();
        a.submit(RtiRequest::RegisterObjectInstance {
            class,
            name: "alpha-1".into(),
        })
        .unwrap();
        drain(&a);

        b.submit(RtiRequest::SubscribeObjectClassAttributes {
            class,
            attributes: [speed].into(),
        })
        .unwrap();
        assert!(drain(&b)
            .iter()
            .any(|cb| matches!(cb, RtiCallback::DiscoverObjectInstance { name, .. } if name == "alpha-1")));
        assert!(drain(&a)
            .iter()
            .any(|cb| matches!(cb, RtiCallback::ProvideAttributeValueUpdate { .. })));
    }

    #[test]
    fn test_constrained_waits_for_regulating_peer() {
        let (rti, a, b) = joined_pair();
        for port in [&a, &b] {
            port.submit(RtiRequest::EnableTimeConstrained).unwrap();
            port.submit(RtiRequest::EnableTimeRegulation {
                federate_time: 0.0,
                lookahead: 10.0,
            })
            .unwrap();
        }
        drain(&a);
        drain(&b);

        a.submit(RtiRequest::TimeAdvanceRequest { time: 20.0 }).unwrap();
        assert!(!drain(&a)
            .iter()
            .any(|cb| matches!(cb, RtiCallback::TimeAdvanceGrant { .. })));

        b.submit(RtiRequest::TimeAdvanceRequest { time: 20.0 }).unwrap();
        assert!(drain(&a)
            .contains(&RtiCallback::TimeAdvanceGrant { time: 20.0 }));
        assert!(drain(&b)
            .contains(&RtiCallback::TimeAdvanceGrant { time: 20.0 }));
        assert_eq!(rti.logical_time(a.id()), Some(20.0));
        assert_eq!(rti.stats().grants, 2);
    }

    #[test]
    fn test_unconstrained_granted_immediately() {
        let (_rti, a, b) = joined_pair();
        b.submit(RtiRequest::EnableTimeRegulation {
            federate_time: 0.0,
            lookahead: 1.0,
        })
        .unwrap();
        a.submit(RtiRequest::TimeAdvanceRequest { time: 500.0 }).unwrap();
        assert!(drain(&a)
            .contains(&RtiCallback::TimeAdvanceGrant { time: 500.0 }));
    }

    #[test]
    fn test_second_tar_in_flight_refused() {
        let (_rti, a, b) = joined_pair();
        a.submit(RtiRequest::EnableTimeConstrained).unwrap();
        b.submit(RtiRequest::EnableTimeRegulation {
            federate_time: 0.0,
            lookahead: 1.0,
        })
        .unwrap();
        drain(&a);
        a.submit(RtiRequest::TimeAdvanceRequest { time: 50.0 }).unwrap();
        let second = a.submit(RtiRequest::TimeAdvanceRequest { time: 60.0 }).unwrap();
        assert_eq!(
            outcome(&drain(&a), second),
            Err(RtiException::TimeAdvanceAlreadyInProgress)
        );
    }

    #[test]
    fn test_save_needs_every_member() {
        let (rti, a, b) = joined_pair();
        rti.request_federation_save("CP1").unwrap();
        assert!(drain(&a).contains(&RtiCallback::InitiateFederateSave { label: "CP1".into() }));
        drain(&b);

        a.submit(RtiRequest::FederateSaveBegun).unwrap();
        a.submit(RtiRequest::FederateSaveComplete).unwrap();
        assert!(!drain(&a).contains(&RtiCallback::FederationSaved));

        b.submit(RtiRequest::FederateSaveComplete).unwrap();
        assert!(drain(&a).contains(&RtiCallback::FederationSaved));
        assert!(drain(&b).contains(&RtiCallback::FederationSaved));
        assert!(rti.saved_labels().contains("CP1"));
        assert!(!rti.handshake_running());
    }

    #[test]
    fn test_one_refusal_fails_the_save() {
        let (rti, a, b) = joined_pair();
        rti.request_federation_save("CP1").unwrap();
        a.submit(RtiRequest::FederateSaveComplete).unwrap();
        b.submit(RtiRequest::FederateSaveNotComplete).unwrap();
        assert!(drain(&a).contains(&RtiCallback::FederationNotSaved));
        assert!(rti.saved_labels().is_empty());
    }

    #[test]
    fn test_restore_of_unknown_label_refused() {
        let (rti, _a, _b) = joined_pair();
        assert!(rti.request_federation_restore("nope").is_err());
    }

    #[test]
    fn test_restore_initiates_with_member_handles() {
        let (rti, a, b) = joined_pair();
        rti.request_federation_save("CP1").unwrap();
        a.submit(RtiRequest::FederateSaveComplete).unwrap();
        b.submit(RtiRequest::FederateSaveComplete).unwrap();
        drain(&a);
        drain(&b);

        rti.request_federation_restore("CP1").unwrap();
        let seen = drain(&b);
        assert_eq!(seen[0], RtiCallback::FederationRestoreBegun);
        assert_eq!(
            seen[1],
            RtiCallback::InitiateFederateRestore {
                label: "CP1".into(),
                federate: FederateHandle(2)
            }
        );
    }

    #[test]
    fn test_resign_deletes_owned_objects() {
        let (rti, a, b) = joined_pair();
        let class = a.object_class_handle("Platform").unwrap();
        a.submit(RtiRequest::PublishObjectClass {
            class,
            attributes: BTreeSet::new(),
        })
        .unwrap();
        b.submit(RtiRequest::SubscribeObjectClassAttributes {
            class,
            attributes: BTreeSet::new(),
        })
        .unwrap();
        a.submit(RtiRequest::RegisterObjectInstance {
            class,
            name: "alpha-1".into(),
        })
        .unwrap();
        drain(&b);

        a.submit(RtiRequest::ResignFederationExecution {
            action: ResignAction::DeleteObjects,
        })
        .unwrap();
        assert!(drain(&b)
            .iter()
            .any(|cb| matches!(cb, RtiCallback::RemoveObjectInstance { .. })));
        assert_eq!(rti.object_count(), 0);
        assert_eq!(rti.member_count(), 1);
    }

    #[test]
    fn test_disconnected_port_refuses() {
        let (rti, a, _b) = joined_pair();
        a.set_connected(false);
        assert!(a.submit(RtiRequest::EnableTimeConstrained).is_err());
        assert_eq!(a.pending(), 0);
        assert_eq!(rti.stats().refused, 1);
    }

    #[test]
    fn test_handles_resolve_both_ways() {
        let rti = SimRti::new();
        let port = rti.connect();
        let class = port.object_class_handle("Platform").unwrap();
        assert_eq!(port.object_class_handle("Platform").unwrap(), class);
        let speed = port.attribute_handle(class, "Speed").unwrap();
        assert_eq!(port.attribute_name(class, speed).unwrap(), "Speed");
        assert!(port.attribute_handle(ObjectClassHandle(99), "Speed").is_err());

        let fire = port.interaction_class_handle("WeaponFire").unwrap();
        let rounds = port.parameter_handle(fire, "Quantity").unwrap();
        assert_eq!(port.parameter_name(fire, rounds).unwrap(), "Quantity");
    }
}
