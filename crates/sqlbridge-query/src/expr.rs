//! Expression trees.
//!
//! Expressions render against a dialect's [`Substitutions`] table: function
//! names, boolean literals, identifier quoting and parameter markers all come
//! from the table, so the same expression tree produces SQL for any dialect.

use crate::clause::{OrderBy, OrderDirection};
use sqlbridge_core::{Error, Result, Substitution, Substitutions, Value};

/// A SQL expression usable in select lists, filters and SET clauses.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column {
        table: Option<String>,
        name: String,
    },
    /// Inline literal, packed by the dialect
    Literal(Value),
    /// Rendered with the dialect's boolean keys
    Bool(bool),
    /// Positional parameter marker
    Param,
    /// Named parameter marker
    Named(String),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Call {
        func: Function,
        args: Vec<Expr>,
    },
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
    },
    NullCheck {
        expr: Box<Expr>,
        is_null: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
    },
    /// The dialect's current timestamp
    Now,
    CountStar,
    Group(Box<Expr>),
    /// Verbatim SQL
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }
}

/// Functions an expression can call.
///
/// The string functions resolve their names through the substitution table;
/// `Other` is rendered verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    Upper,
    Lower,
    Len,
    Substr,
    Count,
    Sum,
    Min,
    Max,
    Coalesce,
    Other(String),
}

impl Function {
    fn name<'a>(&'a self, subs: &'a Substitutions) -> &'a str {
        match self {
            Function::Upper => subs.get(Substitution::Upper),
            Function::Lower => subs.get(Substitution::Lower),
            Function::Len => subs.get(Substitution::Len),
            Function::Substr => subs.get(Substitution::Substr),
            Function::Count => "COUNT",
            Function::Sum => "SUM",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Coalesce => "COALESCE",
            Function::Other(name) => name,
        }
    }
}

macro_rules! binary_ops {
    ($($(#[$doc:meta])* $method:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $method(self, other: impl Into<Expr>) -> Self {
                Expr::Binary {
                    left: Box::new(self),
                    op: BinaryOp::$op,
                    right: Box::new(other.into()),
                }
            }
        )*
    };
}

macro_rules! unary_calls {
    ($($(#[$doc:meta])* $method:ident => $func:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $method(self) -> Self {
                Expr::call(Function::$func, vec![self])
            }
        )*
    };
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// `table.column`
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    pub fn param() -> Self {
        Expr::Param
    }

    pub fn named(name: impl Into<String>) -> Self {
        Expr::Named(name.into())
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    pub fn call(func: Function, args: Vec<Expr>) -> Self {
        Expr::Call { func, args }
    }

    pub fn count_star() -> Self {
        Expr::CountStar
    }

    pub fn coalesce(args: Vec<impl Into<Expr>>) -> Self {
        Expr::call(Function::Coalesce, args.into_iter().map(Into::into).collect())
    }

    binary_ops! {
        eq => Eq,
        ne => Ne,
        lt => Lt,
        le => Le,
        gt => Gt,
        ge => Ge,
        and => And,
        or => Or,
        add => Add,
        sub => Sub,
        mul => Mul,
        div => Div,
        modulo => Mod,
        /// String concatenation (`||`)
        concat => Concat,
    }

    unary_calls! {
        /// Through the dialect's `Upper` key.
        upper => Upper,
        /// Through the dialect's `Lower` key.
        lower => Lower,
        /// String length, through the dialect's `Len` key.
        length => Len,
        count => Count,
        sum => Sum,
        min => Min,
        max => Max,
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Self {
        Expr::Neg(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::NullCheck {
            expr: Box::new(self),
            is_null: true,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::NullCheck {
            expr: Box::new(self),
            is_null: false,
        }
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern.into()),
        }
    }

    /// `self IN (values...)`; an empty list fails to render.
    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Substring with a 1-based start and optional length.
    pub fn substr(self, start: impl Into<Expr>, length: Option<impl Into<Expr>>) -> Self {
        let mut args = vec![self, start.into()];
        args.extend(length.map(Into::into));
        Expr::call(Function::Substr, args)
    }

    pub fn asc(self) -> OrderBy {
        OrderBy::new(self, OrderDirection::Asc)
    }

    pub fn desc(self) -> OrderBy {
        OrderBy::new(self, OrderDirection::Desc)
    }

    /// Wrap in parentheses.
    pub fn paren(self) -> Self {
        Expr::Group(Box::new(self))
    }

    /// Render with the dialect's substitution table.
    pub fn build(&self, subs: &Substitutions) -> Result<String> {
        let sql = match self {
            Expr::Column { table, name } => {
                if name.is_empty() {
                    return Err(Error::syntax("empty column name"));
                }
                match table {
                    Some(t) => format!(
                        "{}.{}",
                        subs.quote_identifier(t),
                        subs.quote_identifier(name)
                    ),
                    None => subs.quote_identifier(name),
                }
            }
            Expr::Literal(value) => subs.pack_literal(value)?,
            Expr::Bool(b) => subs.boolean(*b).to_string(),
            Expr::Param => subs.get(Substitution::NumberedParameter).to_string(),
            Expr::Named(name) => subs.named_parameter(name),
            Expr::Binary { left, op, right } => format!(
                "{} {} {}",
                left.build(subs)?,
                op.symbol(),
                right.build(subs)?
            ),
            Expr::Not(inner) => format!("NOT {}", inner.build(subs)?),
            Expr::Neg(inner) => format!("-{}", inner.build(subs)?),
            Expr::Call { func, args } => {
                format!("{}({})", func.name(subs), build_list(args, subs)?.join(", "))
            }
            Expr::InList { expr, values } => {
                if values.is_empty() {
                    return Err(Error::syntax("IN list must not be empty"));
                }
                format!(
                    "{} IN ({})",
                    expr.build(subs)?,
                    build_list(values, subs)?.join(", ")
                )
            }
            Expr::NullCheck { expr, is_null } => {
                let check = if *is_null { "IS NULL" } else { "IS NOT NULL" };
                format!("{} {check}", expr.build(subs)?)
            }
            Expr::Like { expr, pattern } => {
                format!("{} LIKE {}", expr.build(subs)?, pattern.build(subs)?)
            }
            Expr::Now => subs.get(Substitution::Now).to_string(),
            Expr::CountStar => "COUNT(*)".to_string(),
            Expr::Group(inner) => format!("({})", inner.build(subs)?),
            Expr::Raw(sql) => sql.clone(),
        };
        Ok(sql)
    }
}

pub(crate) fn build_list(exprs: &[Expr], subs: &Substitutions) -> Result<Vec<String>> {
    exprs.iter().map(|e| e.build(subs)).collect()
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Bool(v)
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Literal(v.into())
                }
            }
        )*
    };
}

literal_from!(Value, i32, i64, f64, &str, String);
