//! CQL (Common Query Language) filters over feature attributes and geometry.
//!
//! Syntax:
//!   foo < 3, name = 'x', kind <> 'a'   - comparison
//!   a AND b, a OR b, NOT a, (a)        - logic, AND binds tighter than OR
//!   pop [NOT] BETWEEN 1 AND 10         - range
//!   name [NOT] LIKE 'Ma%'              - pattern, % and _ wildcards
//!   kind [NOT] IN ('a', 'b')           - membership
//!   name IS [NOT] NULL                 - null test
//!   INTERSECTS(geometry, POINT(1 2))   - spatial predicates, WKT literals
//!   INCLUDE, EXCLUDE                   - constant filters

mod ast;
mod eval;
mod parser;

pub use ast::*;
pub use eval::compare;
pub use parser::{parse_expression, parse_filter, parse_filter_with};
