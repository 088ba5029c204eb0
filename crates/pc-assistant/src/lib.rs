pub mod context;
pub mod gateway;
pub mod linkify;
pub mod prompt;
pub mod ratelimit;
pub mod search;

pub use context::{build_context, truncate_text, MAX_FIELD_CHARS, NO_RESULTS};
pub use gateway::AssistantService;
pub use linkify::linkify;
pub use prompt::SYSTEM_PROMPT;
pub use ratelimit::{RateLimitPolicy, RateLimiter};
pub use search::SearchAggregator;

pub use pc_core::{AiResponse, Caller, SearchBundle, SourceCounts};
pub use pc_error::{PcError, Result};
