//! Wire protocol codecs for the remote control service
//!
//! Two independent text encodings, both fixed by the remote service and
//! preserved exactly:
//! - the flat submission encoding produced on upload ([`submit`])
//! - the tag-prefixed fetch/resume stream consumed when resuming a
//!   control ([`resume`])
//!
//! The two formats disagree on details (the submission side carries no
//! coefficients, the resume side does); both are kept as-is rather than
//! unified, since the remote service is fixed.

pub mod escape;
pub mod resume;
pub mod submit;

pub use escape::{escape_comment, unescape_comment};
pub use resume::{decode_resume, encode_resume, DecodedControl, ResumeRecord};
pub use submit::{encode_submission, Submission};
