pub mod page_template;
pub mod run;

pub use page_template::PageTemplate;
pub use run::{Mode, RunOutcome, RunReport, RunState, ServerIdentity};
