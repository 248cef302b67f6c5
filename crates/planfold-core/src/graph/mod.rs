//! In-memory parse graph: arena, vertices, traversal and printing.

mod arena;
mod node;
mod print;
mod walk;

pub use arena::Graph;
pub use node::{
    DeleteStmt, DerivedTableType, DotExpr, Expr, ExprOp, FuncType, FunctionCall, HostVar,
    InsertStmt, JoinType, Name, Node, NodeFlags, NodeId, NodeKind, QueryCommon, SelectQuery,
    SetOpQuery, SortSpec, Spec, SpecMetaClass, TypeEnum, UpdateStmt,
};
pub use print::short_print;
pub use walk::{WalkControl, WalkOutcome};
