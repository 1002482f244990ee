//! Fluent builder for engine traversal scripts.
//!
//! Detection patterns are long multi-hop chains; composing them as typed
//! steps keeps the quoting and nesting correct in one place instead of
//! scattering format strings through the pattern definitions. The builder
//! emits the engine's own traversal language verbatim.

use std::fmt;

fn quote(value: &str) -> String {
	format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// A traversal under construction. Steps append text; nothing is validated
/// beyond quoting, the engine owns the grammar.
#[derive(Debug, Clone)]
pub struct Traversal {
	text: String,
}

impl Traversal {
	/// Root traversal source `g`.
	pub fn source() -> Self {
		Self {
			text: "g".to_string(),
		}
	}

	/// Root traversal source with an engine-side evaluation deadline.
	pub fn source_with_timeout(millis: u64) -> Self {
		Self {
			text: format!("g.with('evaluationTimeout', {})", millis),
		}
	}

	/// Anonymous sub-traversal `__`, for use inside repeat/local/where.
	pub fn anon() -> Self {
		Self {
			text: "__".to_string(),
		}
	}

	fn step(mut self, step: impl AsRef<str>) -> Self {
		self.text.push('.');
		self.text.push_str(step.as_ref());
		self
	}

	pub fn v(self) -> Self {
		self.step("V()")
	}

	pub fn has_label(self, label: &str) -> Self {
		self.step(format!("hasLabel({})", quote(label)))
	}

	pub fn has(self, key: &str, value: &str) -> Self {
		self.step(format!("has({}, {})", quote(key), quote(value)))
	}

	pub fn has_neq(self, key: &str, value: &str) -> Self {
		self.step(format!("has({}, neq({}))", quote(key), quote(value)))
	}

	/// `has(key, <sub-traversal>)`: the property must equal the value the
	/// sub-traversal produces.
	pub fn has_matching(self, key: &str, sub: Traversal) -> Self {
		self.step(format!("has({}, {})", quote(key), sub.text))
	}

	/// Labels the current position (`as(name)`).
	pub fn tag(self, name: &str) -> Self {
		self.step(format!("as({})", quote(name)))
	}

	pub fn select(self, name: &str) -> Self {
		self.step(format!("select({})", quote(name)))
	}

	pub fn select_all(self, names: &[&str]) -> Self {
		let list = names
			.iter()
			.map(|n| quote(n))
			.collect::<Vec<_>>()
			.join(", ");
		self.step(format!("select({})", list))
	}

	/// `select(values)` over a grouped result.
	pub fn select_group_values(self) -> Self {
		self.step("select(values)")
	}

	pub fn by(self, key: &str) -> Self {
		self.step(format!("by({})", quote(key)))
	}

	pub fn by_traversal(self, sub: Traversal) -> Self {
		self.step(format!("by({})", sub.text))
	}

	pub fn by_element_map(self) -> Self {
		self.step("by(elementMap())")
	}

	pub fn out(self, label: &str) -> Self {
		self.step(format!("out({})", quote(label)))
	}

	pub fn in_(self, label: &str) -> Self {
		self.step(format!("in({})", quote(label)))
	}

	pub fn in_e(self, label: &str) -> Self {
		self.step(format!("inE({})", quote(label)))
	}

	/// `repeat(sub).emit()`: emit after each expansion, root excluded.
	pub fn repeat_emit(self, sub: Traversal) -> Self {
		self.step(format!("repeat({}).emit()", sub.text))
	}

	/// `emit().repeat(sub)`: emit before each expansion, root included.
	pub fn emit_repeat(self, sub: Traversal) -> Self {
		self.step(format!("emit().repeat({})", sub.text))
	}

	pub fn local(self, sub: Traversal) -> Self {
		self.step(format!("local({})", sub.text))
	}

	/// `where(tag, neq(other)).`
	pub fn where_neq(self, tag: &str, other: &str) -> Self {
		self.step(format!("where({}, neq({}))", quote(tag), quote(other)))
	}

	/// `where(tag, eq(other)).`
	pub fn where_eq(self, tag: &str, other: &str) -> Self {
		self.step(format!("where({}, eq({}))", quote(tag), quote(other)))
	}

	/// `where(eq(tag))`: the current element must be the tagged one.
	pub fn where_is(self, tag: &str) -> Self {
		self.step(format!("where(eq({}))", quote(tag)))
	}

	pub fn where_traversal(self, sub: Traversal) -> Self {
		self.step(format!("where({})", sub.text))
	}

	pub fn dedup(self) -> Self {
		self.step("dedup()")
	}

	pub fn limit(self, n: u64) -> Self {
		self.step(format!("limit({})", n))
	}

	pub fn count(self) -> Self {
		self.step("count()")
	}

	pub fn is_gt(self, n: i64) -> Self {
		self.step(format!("is(gt({}))", n))
	}

	pub fn values(self, key: &str) -> Self {
		self.step(format!("values({})", quote(key)))
	}

	pub fn element_map(self) -> Self {
		self.step("elementMap()")
	}

	pub fn group(self) -> Self {
		self.step("group()")
	}

	pub fn unfold(self) -> Self {
		self.step("unfold()")
	}

	pub fn max(self) -> Self {
		self.step("max()")
	}

	/// Finishes the traversal and returns the script text.
	pub fn script(self) -> String {
		self.text
	}
}

impl fmt::Display for Traversal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.text)
	}
}
