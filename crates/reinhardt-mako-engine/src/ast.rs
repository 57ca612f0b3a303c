//! Template node tree produced by the parser

use crate::expr::Expr;
use serde::{Deserialize, Serialize};

/// A formal parameter of a `<%def>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
	pub name: String,
	pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	Text {
		text: String,
		line: usize,
	},
	Expression {
		expr: Expr,
		filters: Vec<String>,
		line: usize,
	},
	For {
		targets: Vec<String>,
		iter: Expr,
		body: Vec<Node>,
		line: usize,
	},
	If {
		branches: Vec<Branch>,
		otherwise: Option<Vec<Node>>,
		line: usize,
	},
}

/// One `if`/`elif` arm
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
	pub cond: Expr,
	pub body: Vec<Node>,
	pub line: usize,
}

/// A named sub-block declared with `<%def>`
#[derive(Debug, Clone, PartialEq)]
pub struct DefNode {
	pub name: String,
	pub params: Vec<Param>,
	pub body: Vec<Node>,
	pub line: usize,
}

/// A parsed template: top-level body plus every def, hoisted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
	pub body: Vec<Node>,
	pub defs: Vec<DefNode>,
}
