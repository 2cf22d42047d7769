//! Text normalization shared by the parser, fuzzy matcher, index and highlighter

mod tokenizer;

pub use tokenizer::{index_terms, is_negative_number, normalize, part_sequence, tokenize, Token};
