//! CartoCSS stylesheets and CQL filters: parsing, cascade flattening and
//! per-feature evaluation.
//!
//! ```
//! use carto::{MapFeature, eval, parse_stylesheet, select};
//!
//! let sheet = parse_stylesheet("#roads { line-width: 1; [lanes > 2] { line-width: 3; } }").unwrap();
//! let rules = select(sheet.flat_rules(), "roads");
//! let road = MapFeature::new().with_attribute("lanes", 4);
//! assert_eq!(eval(&rules, Some(&road), "line-width", 0i64).unwrap(), 3);
//! ```

pub mod cascade;
pub mod color;
pub mod config;
pub mod cql;
pub mod error;
pub mod evaluator;
pub mod feature;
pub mod function;
pub mod style;
pub mod token;
pub mod value;

mod utils;

pub use cascade::{FlatRule, flatten, group_by_attachment, referenced_properties};
pub use color::Rgb;
pub use config::ParseOptions;
pub use cql::{Expression, Filter, parse_filter, parse_filter_with};
pub use error::{EvaluationError, LexicalError, ParseError, SyntaxError};
pub use evaluator::{Evaluator, eval, select};
pub use feature::{Feature, MapFeature};
pub use function::FunctionRegistry;
pub use style::{Rule, Selector, Stylesheet, parse_stylesheet, parse_stylesheet_with};
pub use value::{FromValue, Value};
