//! Tag-query index for the hot path of a metrics publisher: given a set of
//! boolean predicates over tag maps known in advance, efficiently return the
//! subset that matches an incoming tagged identity, without scanning every
//! registered predicate.
//!
//! ```
//! use tagsieve::{Expr, Id, QueryIndex};
//!
//! let idx = QueryIndex::new();
//! idx.add(&Expr::eq("name", "cpu").and(Expr::eq("app", "foo")), "sub-1");
//!
//! let id = Id::new("cpu").with_tag("app", "foo").with_tag("host", "h1");
//! assert_eq!(idx.find_matches(&id), vec!["sub-1"]);
//! ```

pub mod error;
pub mod id;
pub mod index;
pub mod query;

pub use error::{QueryError, QueryErrorCode};
pub use id::Id;
pub use index::QueryIndex;
pub use index::cache::{CacheSupplier, LruCacheSupplier, LruResultCache, ResultCache};
pub use query::{Expr, KeyQuery, MAX_EXPR_DEPTH, Pattern};
