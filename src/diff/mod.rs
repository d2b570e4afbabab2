pub mod member_diff;
pub mod token_diff;
pub mod tokens;
pub mod tree_diff;

pub use member_diff::{collect_members, DiffLine, DiffLineKind, MemberDiffer, MemberSite};
pub use token_diff::{default_similarity, similar_with_threshold, TokenChange, TokenDiffEngine};
pub use tokens::{tokenize, Token, TokenKind};
pub use tree_diff::{structural_hash, ModifiedChange, TreeChange, TreeChangeType, TreeDiff, TreeDiffer};
