use std::time::Duration;

// Event Scheduler loop periods.
pub const FILL_LOOP_INTERVAL: Duration = Duration::from_secs(60);
pub const LOBBY_OPEN_LOOP_INTERVAL: Duration = Duration::from_secs(30);
pub const ROLLOVER_LOOP_INTERVAL: Duration = Duration::from_secs(30);
pub const EXPIRY_LOOP_INTERVAL: Duration = Duration::from_secs(30);

// How far ahead the fill loop keeps the event sequence populated.
pub const FILL_HORIZON: Duration = Duration::from_secs(2 * 60 * 60);
// Spacing between auto-created events.
pub const FILL_SPACING: Duration = Duration::from_secs(60);
// De-duplication bucket half-width used by the fill loop's find-or-create check.
pub const FILL_BUCKET_TOLERANCE: Duration = Duration::from_secs(60);

// Window before an event's start_at during which its lobby opens.
pub const LOBBY_OPEN_WINDOW: Duration = Duration::from_secs(60);

// Rollover loop only considers events completed within this trailing window.
pub const ROLLOVER_LOOKBACK: Duration = Duration::from_secs(2 * 60);
// Successor events are spaced this far from their predecessor's completion.
pub const ROLLOVER_SPACING: Duration = Duration::from_secs(60);

// Lobby Manager.
pub const LOBBY_JOIN_WINDOW: Duration = Duration::from_secs(60);
pub const LOBBY_RECREATE_WINDOW: Duration = Duration::from_secs(120);
pub const COUNTDOWN_TICK: Duration = Duration::from_millis(100);
pub const COUNTDOWN_EMIT_THROTTLE: Duration = Duration::from_millis(500);

// Quiz Engine.
pub const PER_QUESTION_DURATION: Duration = Duration::from_secs(15);
pub const AD_BREAK_DURATION: Duration = Duration::from_secs(15);
pub const ROUND_TEARDOWN_GRACE: Duration = Duration::from_secs(5);

// Session Registry.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const SYSTEM_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const SESSION_IDLE_EVICTION: Duration = Duration::from_secs(10 * 60);
pub const HEAP_EVICTION_THRESHOLD: f32 = 0.80;
pub const FORCE_LOGOUT_GRACE: Duration = Duration::from_millis(500);

pub const DEFAULT_QUESTION_COUNT: usize = 5;
pub const DEFAULT_MIN_PLAYERS: usize = 2;
