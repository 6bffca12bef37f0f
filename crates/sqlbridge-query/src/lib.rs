//! Structured SQL query builder for sqlbridge.
//!
//! `sqlbridge-query` is the **query construction layer**. It provides builders
//! that implement the [`sqlbridge_core::Query`] contract: each renders itself
//! against a dialect's substitution table, and rejects malformed queries with
//! syntax errors before any SQL reaches a driver.
//!
//! - **Data queries**: [`Select`], [`Insert`], [`Update`], [`Delete`]
//! - **Expression DSL**: [`Expr`] for WHERE clauses, SELECT lists and SET values
//! - **DDL**: [`Table`] with [`CreateTable`], [`AlterTable`], [`DropTable`]
//!
//! The resulting queries execute through the `Connection` trait from
//! `sqlbridge-core`.

pub mod builder;
pub mod clause;
pub mod expr;
pub mod schema;
pub mod select;

pub use builder::{Delete, Insert, Update};
pub use clause::{Limit, Offset, OrderBy, OrderDirection, Where};
pub use expr::{BinaryOp, Expr, Function};
pub use schema::{AlterTable, CreateTable, DropTable, Table};
pub use select::Select;
