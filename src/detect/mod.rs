mod backend;
pub mod backends;
mod decode;
mod nms;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use decode::{Decoder, DEFAULT_CONFIDENCE_THRESHOLD};
pub use nms::{SuppressionScope, Suppressor, DEFAULT_NMS_THRESHOLD};
pub use result::{Candidate, DetectionResult, RawDetection, RawTensor, ROW_PREFIX_LEN};
