//! Text handling ahead of synthesis: narration segmentation and clean-up.

pub mod filter;
pub mod segmenter;

pub use filter::{apply_filtering, clean_segment, decode_html_entities, prepare_narration};
pub use segmenter::{Segmenter, segment};
