/// Fraction of the scratch surface that must be cleared before a ticket reveals.
pub const SCRATCH_REVEAL_THRESHOLD: f64 = 0.60;

/// Number of trailing messages kept for the global community chat.
pub const GLOBAL_CHAT_WINDOW: usize = 50;

/// Win-to-bet ratio at or above which a win is celebrated as a big win.
pub const BIG_WIN_MULTIPLIER: f64 = 10.0;

/// Slot symbols indexed by the reel values returned from a spin.
pub const SLOT_SYMBOLS: [&str; 7] = ["🍒", "🍋", "🍊", "🍇", "🔔", "💎", "7️⃣"];

/// Visible reels on the classic slot machine
pub const SLOT_REELS: usize = 3;

/// Default number of tabs on a pull-tab ticket
pub const DEFAULT_PULL_TABS: u8 = 3;

/// Maximum length of a single chat message
pub const MAX_CHAT_MESSAGE_LENGTH: usize = 500;

/// Header carrying the client-generated idempotency key on retried submissions.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
