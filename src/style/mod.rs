//! CartoCSS stylesheets: selectors, nested rules and declarations.
//!
//! Syntax:
//!   Map { background-color: #fff; }          - layer name
//!   #roads { line-width: 1px; }              - layer id
//!   .major { line-color: red; }              - class
//!   #roads[lanes > 2] { ... }                - CQL filter, adjacent filters AND
//!   #roads::casing { ... }                   - attachment (separate symbolizer pass)
//!   * { ... }                                - wildcard
//!   #roads { [zoom > 10] { ... } }           - nesting
//!   line-color: interpolate([pop], red, blue, 0, 1000)  - functions and attributes

mod parser;
mod rule;
mod selector;

pub use parser::{parse_stylesheet, parse_stylesheet_with};
pub use rule::{Rule, Stylesheet};
pub use selector::Selector;
