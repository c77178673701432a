mod request;
mod result;
mod state;
mod task;
mod transcode;

pub use request::{SubmitRequest, SubmitResponse};
pub use result::TranscriptResult;
pub use state::JobState;
pub use task::{RecognizeInput, Task};
pub use transcode::{ReplyAddress, ReplyAddressError, TranscodeRequest, REPLY_ADDRESS_SEPARATOR};
