//! Quiz engine: pure functions shared by the question generator and the
//! answer checker. Nothing in here touches storage or the network.

pub mod checker;
pub mod fill_in_blank;
pub mod kana;
pub mod normalize;
pub mod options;

pub use checker::check_answer;
pub use fill_in_blank::{create_fill_in_blank, gap_count, FillInBlank, GAP_CHAR, MIN_READING_LEN};
pub use normalize::normalize;
pub use options::{build_options, option_text, DISTRACTOR_COUNT};
