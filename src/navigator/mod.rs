pub mod consent;
pub mod expander;
pub mod wait;
pub mod walker;

pub use self::consent::{ConsentOutcome, dismiss_if_present};
pub use self::expander::{ExpandOutcome, expand_to_all};
pub use self::wait::WaitPolicy;
pub use self::walker::{MonthWalker, SeasonWalker, SubPage, visit};
