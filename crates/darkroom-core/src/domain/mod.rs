//! Domain model: the job envelope, detections, identifiers, naming policy, errors.

pub mod detection;
pub mod dims;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod naming;

pub use self::detection::{BoxCorners, Detection, Label, label_name};
pub use self::dims::Dimensions;
pub use self::envelope::JobEnvelope;
pub use self::errors::{ErrorKind, PipelineError};
pub use self::ids::ImageId;
pub use self::naming::StageKind;
