//! Join and subquery rewrites: path-join classification, OID-equality
//! derived tables, uncorrelated-subquery-to-join conversion, outer-join
//! reduction, explicit-join flattening, and ORDER BY cleanup.

mod join;
mod oid_equality;
mod order_by;
mod path_join;
mod subquery;

pub use join::{reset_location_range, rewrite_innerjoin, rewrite_outerjoin};
pub use oid_equality::rewrite_oid_equality;
pub use order_by::{
    reduce_order_by, rewrite_hidden_col_as_derived, wrap_query_as_derived, HiddenColContext,
};
pub use path_join::analyze_path_join;
pub use subquery::rewrite_subqueries;
