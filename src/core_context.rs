//! Resolves the scheduler↔quiz-engine relationship explicitly instead of a
//! process-wide mutable global (see DESIGN NOTES §9 / REDESIGN FLAGS). Every
//! aggregate is constructed once in `start_server` and handed around as a
//! `Clone`-able handle — this struct is just where that wiring happens, and
//! the single `Extension` layered onto the router for handlers that need
//! more than one aggregate at a time.

use std::sync::Arc;

use crate::{
    auth_external::{OtpGateway, TokenIssuer},
    broadcast::BroadcastHub,
    event_store::EventStore,
    lobby::LobbyManager,
    question_store::QuestionStore,
    quiz::QuizEngine,
    scheduler::Scheduler,
    sessions::SessionRegistry,
    user_store::UserStore,
};

#[derive(Clone)]
pub struct CoreContext {
    pub event_store: Arc<EventStore>,
    pub question_store: Arc<QuestionStore>,
    pub user_store: Arc<UserStore>,
    pub sessions: SessionRegistry,
    pub hub: BroadcastHub,
    pub lobby: LobbyManager,
    pub quiz: QuizEngine,
    pub scheduler: Scheduler,
    pub otp_gateway: Arc<dyn OtpGateway>,
    pub token_issuer: Arc<dyn TokenIssuer>,
}

impl CoreContext {
    #[must_use]
    pub fn new(
        event_store: Arc<EventStore>,
        question_store: Arc<QuestionStore>,
        user_store: Arc<UserStore>,
        otp_gateway: Arc<dyn OtpGateway>,
        token_issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        let sessions = SessionRegistry::default();
        let hub = BroadcastHub::new(sessions.clone());
        let quiz = QuizEngine::new(
            event_store.clone(),
            question_store.clone(),
            user_store.clone(),
            sessions.clone(),
        );
        let lobby = LobbyManager::new(event_store.clone(), quiz.clone(), hub.clone());
        let scheduler = Scheduler::new(event_store.clone(), lobby.clone(), quiz.clone());

        Self {
            event_store,
            question_store,
            user_store,
            sessions,
            hub,
            lobby,
            quiz,
            scheduler,
            otp_gateway,
            token_issuer,
        }
    }
}
