//! Session coordinator
//!
//! Owns every open sheet, every live session and the credential map behind a
//! single coordination lock. Each inbound record is decoded and dispatched
//! while the lock is held, so all mutations of a sheet are linearized and
//! every subscriber sees snapshots in the order they were produced. Outbound
//! records are queued on per-session channels and never block the caller.
//!
//! File I/O happens after the coordination lock is released, under a
//! separate persistence lock. Writes copy the current state while holding
//! that lock, so a later write never carries older state than an earlier one.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::persistence::{Credentials, SheetRepository};
use crate::core::{Sheet, SheetRecord};
use crate::error::{SheetError, SheetResult};
use crate::protocol::frame::RECORD_TERMINATOR;
use crate::protocol::{Command, ServerMessage, SheetOrder, UserOrder};

pub type SessionId = u64;

/// Items queued for a session's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    /// Write whatever was queued before this, then drop the connection.
    Close,
}

/// What the session task should do after a record was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

/// Outcome of a successful credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Login {
    Existing,
    Registered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    AwaitingCredentials,
    Attached(String),
    Admin,
}

struct Session {
    state: SessionState,
    outbox: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    fn send(&self, frame: &str) {
        // A closed receiver means the session task is already tearing down.
        let _ = self.outbox.send(Outbound::Frame(frame.to_string()));
    }

    fn close(&self) {
        let _ = self.outbox.send(Outbound::Close);
    }
}

/// Persistence work noted under the coordination lock and run after it is
/// released. Effects name what to write, never a copy of it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    SaveUsers,
    SaveSheetNames,
    RemoveSheet(String),
    Shutdown,
}

impl Effect {
    fn label(&self) -> &'static str {
        match self {
            Effect::SaveUsers => "save users",
            Effect::SaveSheetNames => "save sheet index",
            Effect::RemoveSheet(_) => "remove sheet",
            Effect::Shutdown => "shutdown",
        }
    }
}

/// Result of [`Coordinator::receive`]: the session's next step plus any
/// pending persistence work for [`Coordinator::complete`].
#[must_use]
pub struct Dispatch {
    flow: Flow,
    effects: Vec<Effect>,
}

impl Dispatch {
    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// Does completing this dispatch touch the repository?
    pub fn has_effects(&self) -> bool {
        !self.effects.is_empty()
    }

    fn proceed() -> Self {
        Self {
            flow: Flow::Continue,
            effects: Vec::new(),
        }
    }

    fn disconnect() -> Self {
        Self {
            flow: Flow::Disconnect,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        if !self.effects.contains(&effect) {
            self.effects.push(effect);
        }
        self
    }
}

struct State {
    sheets: BTreeMap<String, Sheet>,
    subscribers: HashMap<String, HashSet<SessionId>>,
    sessions: HashMap<SessionId, Session>,
    users: Credentials,
    admin: Option<SessionId>,
    next_id: SessionId,
    running: bool,
}

pub struct Coordinator {
    state: Mutex<State>,
    /// Held for every repository write; always taken before `state`.
    persist: Mutex<()>,
    repository: Arc<dyn SheetRepository>,
    stop: watch::Sender<bool>,
}

impl Coordinator {
    /// Empty coordinator; nothing is loaded from `repository`.
    pub fn new(repository: Arc<dyn SheetRepository>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            state: Mutex::new(State {
                sheets: BTreeMap::new(),
                subscribers: HashMap::new(),
                sessions: HashMap::new(),
                users: Credentials::new(),
                admin: None,
                next_id: 1,
                running: true,
            }),
            persist: Mutex::new(()),
            repository,
            stop,
        }
    }

    /// Reload every indexed sheet and the credential file.
    pub fn load(repository: Arc<dyn SheetRepository>) -> SheetResult<Self> {
        let coordinator = Self::new(Arc::clone(&repository));
        {
            let mut state = coordinator.lock();
            for name in repository.load_sheet_names()? {
                let sheet = match repository.load_sheet(&name)? {
                    Some(mut record) => {
                        if record.name != name {
                            warn!(index = %name, record = %record.name, "sheet record name differs from index, using index name");
                            record.name = name.clone();
                        }
                        Sheet::from_record(record)?
                    }
                    None => Sheet::new(name.clone()),
                };
                state.sheets.insert(name, sheet);
            }
            state.users = repository.load_users()?;
            info!(
                sheets = state.sheets.len(),
                users = state.users.len(),
                "loaded persisted state"
            );
        }
        Ok(coordinator)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_lock(&self) -> MutexGuard<'_, ()> {
        self.persist.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //==========================================================================
    // Session lifecycle
    //==========================================================================

    /// Register a freshly connected session and send it the sheet list.
    pub fn connect(&self, outbox: mpsc::UnboundedSender<Outbound>) -> SessionId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;

        let session = Session {
            state: SessionState::AwaitingCredentials,
            outbox,
        };
        if state.running {
            if let Some(frame) = frame(&ServerMessage::list(state.sheet_names())) {
                session.send(&frame);
            }
        } else {
            session.close();
        }
        state.sessions.insert(id, session);
        id
    }

    /// Drop a session and every reference to it.
    pub fn disconnect(&self, id: SessionId) {
        let mut state = self.lock();
        let Some(session) = state.sessions.remove(&id) else {
            return;
        };
        if let SessionState::Attached(sheet) = &session.state {
            if let Some(set) = state.subscribers.get_mut(sheet) {
                set.remove(&id);
                if set.is_empty() {
                    state.subscribers.remove(sheet);
                }
            }
        }
        if state.admin == Some(id) {
            state.admin = None;
            info!(session = id, "admin disconnected");
        }
    }

    /// Handle one inbound record from session `id`, including any file I/O
    /// it causes.
    pub fn handle_payload(&self, id: SessionId, payload: &str) -> Flow {
        let dispatch = self.receive(id, payload);
        self.complete(dispatch)
    }

    /// Apply one inbound record to the in-memory state. Never touches the
    /// repository; pass the result to [`Coordinator::complete`].
    pub fn receive(&self, id: SessionId, payload: &str) -> Dispatch {
        let mut state = self.lock();
        let Some(session_state) = state.sessions.get(&id).map(|s| s.state.clone()) else {
            return Dispatch::disconnect();
        };

        if session_state != SessionState::Admin {
            state.mirror_to_admin(payload);
        }

        match Command::decode(payload) {
            Err(e) => {
                warn!(session = id, error = %e, "disconnecting session after malformed input");
                Dispatch::disconnect()
            }
            Ok(command) => {
                debug!(session = id, kind = command.kind(), "dispatching command");
                match session_state {
                    SessionState::AwaitingCredentials => state.handle_login(id, command),
                    SessionState::Attached(sheet) => state.handle_edit(id, &sheet, command),
                    SessionState::Admin => state.handle_admin(id, command),
                }
            }
        }
    }

    /// Run the persistence work of a dispatch. Blocks on file I/O.
    pub fn complete(&self, dispatch: Dispatch) -> Flow {
        for effect in &dispatch.effects {
            self.run_effect(effect);
        }
        dispatch.flow
    }

    fn run_effect(&self, effect: &Effect) {
        let result = match effect {
            Effect::Shutdown => {
                self.shutdown();
                Ok(())
            }
            Effect::SaveUsers => {
                let _persist = self.persist_lock();
                let users = self.lock().users.clone();
                self.repository.save_users(&users)
            }
            Effect::SaveSheetNames => {
                let _persist = self.persist_lock();
                let names = self.lock().sheet_names();
                self.repository.save_sheet_names(&names)
            }
            Effect::RemoveSheet(name) => {
                let _persist = self.persist_lock();
                if self.lock().sheets.contains_key(name) {
                    debug!(sheet = %name, "sheet recreated before its record was removed");
                    Ok(())
                } else {
                    self.repository.remove_sheet(name)
                }
            }
        };
        if let Err(e) = result {
            error!(effect = effect.label(), error = %e, "persistence failed");
        }
    }

    //==========================================================================
    // Persistence and shutdown
    //==========================================================================

    /// Save every dirty sheet. Dirty flags are cleared under the lock and
    /// restored for any sheet whose save fails. Returns the number saved.
    ///
    /// Copies and writes happen under the persistence lock, so a sheet
    /// deleted meanwhile is removed only after its last copy was written.
    pub fn persist_dirty(&self) -> usize {
        let _persist = self.persist_lock();
        let records: Vec<SheetRecord> = {
            let mut state = self.lock();
            state
                .sheets
                .values_mut()
                .filter(|sheet| sheet.is_dirty())
                .map(|sheet| {
                    sheet.mark_clean();
                    sheet.to_record()
                })
                .collect()
        };

        let mut saved = 0;
        for record in records {
            match self.repository.save_sheet(&record) {
                Ok(()) => saved += 1,
                Err(e) => {
                    error!(sheet = %record.name, error = %e, "failed to save sheet");
                    if let Some(sheet) = self.lock().sheets.get_mut(&record.name) {
                        sheet.mark_dirty();
                    }
                }
            }
        }
        if saved > 0 {
            debug!(saved, "saved changed sheets");
        }
        saved
    }

    /// Acknowledge shutdown to every session, disconnect them all, flush
    /// dirty sheets and raise the stop signal. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock();
            if !state.running {
                return;
            }
            state.running = false;

            let ack = frame(&ServerMessage::message("Server shutting down"));
            for session in state.sessions.values() {
                if let Some(ack) = &ack {
                    session.send(ack);
                }
                session.close();
            }
            info!(sessions = state.sessions.len(), "shutting down coordinator");
            state.sessions.clear();
            state.subscribers.clear();
            state.admin = None;
        }

        self.persist_dirty();
        self.stop.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Receiver that flips to `true` once [`Coordinator::shutdown`] ran.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    //==========================================================================
    // Inspection
    //==========================================================================

    pub fn sheet_names(&self) -> Vec<String> {
        self.lock().sheet_names()
    }

    pub fn users(&self) -> Credentials {
        self.lock().users.clone()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn subscriber_count(&self, sheet: &str) -> usize {
        self.lock().subscribers.get(sheet).map_or(0, HashSet::len)
    }

    pub fn admin(&self) -> Option<SessionId> {
        self.lock().admin
    }

    /// Run `f` against a sheet while holding the coordination lock.
    pub fn with_sheet<R>(&self, name: &str, f: impl FnOnce(&Sheet) -> R) -> Option<R> {
        self.lock().sheets.get(name).map(f)
    }
}

/// First-come-wins login: unknown usernames are registered with the given
/// password, known ones must match it.
pub fn check_credentials(
    users: &mut Credentials,
    username: &str,
    password: &str,
) -> SheetResult<Login> {
    match users.get(username) {
        None => {
            users.insert(username.to_string(), password.to_string());
            Ok(Login::Registered)
        }
        Some(stored) if stored == password => Ok(Login::Existing),
        Some(_) => Err(SheetError::BadCredentials(username.to_string())),
    }
}

/// Sheet names double as file names; path separators become `_`.
pub fn sanitize_sheet_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

fn frame(message: &ServerMessage) -> Option<String> {
    match message.encode() {
        Ok(text) => Some(text),
        Err(e) => {
            error!(error = %e, "failed to encode server message");
            None
        }
    }
}

impl State {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.keys().cloned().collect()
    }

    fn send_to(&self, id: SessionId, message: &ServerMessage) {
        if let (Some(session), Some(text)) = (self.sessions.get(&id), frame(message)) {
            session.send(&text);
        }
    }

    fn notify_admin(&self, message: &ServerMessage) {
        if let Some(admin) = self.admin {
            self.send_to(admin, message);
        }
    }

    /// Pass a raw inbound record through to the admin observer.
    fn mirror_to_admin(&self, payload: &str) {
        if let Some(session) = self.admin.and_then(|admin| self.sessions.get(&admin)) {
            session.send(&format!("{}{RECORD_TERMINATOR}", payload.trim()));
        }
    }

    /// Send the sheet's full snapshot to every session attached to it.
    fn broadcast_snapshot(&self, sheet_name: &str) {
        let Some(sheet) = self.sheets.get(sheet_name) else {
            return;
        };
        let Some(text) = frame(&ServerMessage::full_send(sheet)) else {
            return;
        };
        let Some(subscribers) = self.subscribers.get(sheet_name) else {
            return;
        };
        for session in subscribers.iter().filter_map(|id| self.sessions.get(id)) {
            session.send(&text);
        }
    }

    fn set_session_state(&mut self, id: SessionId, new_state: SessionState) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = new_state;
        }
    }

    //==========================================================================
    // Awaiting credentials
    //==========================================================================

    fn handle_login(&mut self, id: SessionId, command: Command) -> Dispatch {
        match command {
            Command::Open {
                name,
                username,
                password,
            } => self.open_sheet(id, &name, &username, &password),
            Command::Admin => {
                if let Some(previous) = self.admin.replace(id) {
                    warn!(previous, session = id, "admin role taken over");
                    self.set_session_state(previous, SessionState::AwaitingCredentials);
                }
                self.set_session_state(id, SessionState::Admin);
                info!(session = id, "admin attached");
                self.send_to(id, &ServerMessage::state(self.users.clone()));
                self.send_to(id, &ServerMessage::list(self.sheet_names()));
                Dispatch::proceed()
            }
            other => {
                warn!(session = id, kind = other.kind(), "unexpected command before login");
                Dispatch::disconnect()
            }
        }
    }

    fn open_sheet(&mut self, id: SessionId, name: &str, username: &str, password: &str) -> Dispatch {
        let mut dispatch = Dispatch::proceed();

        match check_credentials(&mut self.users, username, password) {
            Err(e) => {
                info!(session = id, error = %e, "login rejected");
                self.send_to(id, &ServerMessage::bad_credentials());
                self.send_to(id, &ServerMessage::list(self.sheet_names()));
                return dispatch;
            }
            Ok(Login::Registered) => {
                info!(session = id, username, "registered new user");
                self.notify_admin(&ServerMessage::state(self.users.clone()));
                dispatch = dispatch.with(Effect::SaveUsers);
            }
            Ok(Login::Existing) => {}
        }

        let sheet_name = sanitize_sheet_name(name);
        if !self.sheets.contains_key(&sheet_name) {
            info!(sheet = %sheet_name, "creating spreadsheet");
            self.sheets
                .insert(sheet_name.clone(), Sheet::new(sheet_name.clone()));
            dispatch = dispatch.with(Effect::SaveSheetNames);
        }

        if let Some(sheet) = self.sheets.get(&sheet_name) {
            self.send_to(id, &ServerMessage::full_send(sheet));
        }
        self.subscribers
            .entry(sheet_name.clone())
            .or_default()
            .insert(id);
        info!(session = id, username, sheet = %sheet_name, "session attached");
        self.set_session_state(id, SessionState::Attached(sheet_name));
        self.notify_admin(&ServerMessage::list(self.sheet_names()));
        dispatch
    }

    //==========================================================================
    // Attached to a sheet
    //==========================================================================

    fn handle_edit(&mut self, id: SessionId, sheet_name: &str, command: Command) -> Dispatch {
        let Some(sheet) = self.sheets.get_mut(sheet_name) else {
            warn!(session = id, sheet = sheet_name, "attached sheet no longer exists");
            return Dispatch::disconnect();
        };

        let result = match command {
            Command::Edit {
                cell,
                value,
                dependencies,
            } => sheet.set_cell_contents(&cell, value.into_contents(), dependencies),
            Command::Revert { cell } => sheet.revert_cell(&cell),
            Command::Undo => sheet.undo().map(|outcome| {
                debug!(sheet = sheet_name, ?outcome, "undo");
            }),
            other => {
                debug!(session = id, kind = other.kind(), "ignoring command while attached");
                return Dispatch::proceed();
            }
        };

        match result {
            Ok(()) => self.broadcast_snapshot(sheet_name),
            Err(rejected) => {
                debug!(session = id, error = %rejected, "edit rejected");
                self.send_to(id, &ServerMessage::circular_dependency(rejected.cell()));
            }
        }
        Dispatch::proceed()
    }

    //==========================================================================
    // Admin
    //==========================================================================

    fn handle_admin(&mut self, id: SessionId, command: Command) -> Dispatch {
        match command {
            Command::Admin => {
                self.send_to(id, &ServerMessage::state(self.users.clone()));
                self.send_to(id, &ServerMessage::list(self.sheet_names()));
                Dispatch::proceed()
            }
            Command::Close => {
                info!(session = id, "admin requested shutdown");
                Dispatch::disconnect().with(Effect::Shutdown)
            }
            Command::User {
                order,
                username,
                password,
            } => {
                match order {
                    UserOrder::New | UserOrder::Change => {
                        self.users.insert(username.clone(), password);
                    }
                    UserOrder::Delete => {
                        self.users.remove(&username);
                    }
                }
                info!(?order, username = %username, "credentials updated");
                self.send_to(id, &ServerMessage::state(self.users.clone()));
                Dispatch::proceed().with(Effect::SaveUsers)
            }
            Command::Sheet { order, name } => {
                let sheet_name = sanitize_sheet_name(&name);
                let dispatch = match order {
                    SheetOrder::New => {
                        if !self.sheets.contains_key(&sheet_name) {
                            info!(sheet = %sheet_name, "admin created spreadsheet");
                            self.sheets
                                .insert(sheet_name.clone(), Sheet::new(sheet_name.clone()));
                        }
                        Dispatch::proceed().with(Effect::SaveSheetNames)
                    }
                    SheetOrder::Delete => match self.delete_sheet(&sheet_name) {
                        Ok(()) => Dispatch::proceed()
                            .with(Effect::RemoveSheet(sheet_name))
                            .with(Effect::SaveSheetNames),
                        Err(e) => {
                            info!(error = %e, "admin delete refused");
                            self.send_to(
                                id,
                                &ServerMessage::message(format!(
                                    "Unable to delete spreadsheet: {name}, currently active"
                                )),
                            );
                            Dispatch::proceed()
                        }
                    },
                };
                self.send_to(id, &ServerMessage::list(self.sheet_names()));
                dispatch
            }
            other => {
                debug!(session = id, kind = other.kind(), "ignoring command from admin");
                Dispatch::proceed()
            }
        }
    }

    fn delete_sheet(&mut self, sheet_name: &str) -> SheetResult<()> {
        if self
            .subscribers
            .get(sheet_name)
            .is_some_and(|set| !set.is_empty())
        {
            return Err(SheetError::SheetInUse(sheet_name.to_string()));
        }
        if self.sheets.remove(sheet_name).is_some() {
            info!(sheet = sheet_name, "admin deleted spreadsheet");
        }
        self.subscribers.remove(sheet_name);
        Ok(())
    }
}
