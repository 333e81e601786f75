//! Domain models shared by the store, services and routes

mod content;
mod file;
mod quota;
mod request;
mod video;

pub use content::{ContentType, GeneratedContent, NewContent};
pub use file::FileRef;
pub use quota::{PlanStatus, PlanUpdate, QuotaRecord, QuotaSummary};
pub use request::{
    ContentSnapshot, FulfillmentRequest, RequestPayload, RequestStatus, ViewVersion,
};
pub use video::{Transcript, Video, VideoInput};
