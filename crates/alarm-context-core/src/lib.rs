//! Pure building blocks for enriching CloudWatch alarm notifications.
//!
//! Nothing here talks to AWS. The Lambda crate fetches data and hands it to
//! these functions to derive queries, links, prompts and the email.

pub mod alarm;
pub mod cloudformation;
pub mod dashboard;
pub mod dimensions;
pub mod email;
pub mod error;
pub mod handlers;
pub mod html;
pub mod links;
pub mod logs;
pub mod model;
pub mod prompt;
pub mod query;
pub mod trace;

pub use alarm::{AlarmArn, AlarmWindow};
pub use dimensions::DimensionSet;
pub use error::{AwsApiError, CoreError};
pub use handlers::{Handler, HandlerPlan, RequestEnv, ResourceOutcome, ResourceRequest};
pub use model::{AlarmEvent, HandlerResult};
