//! `${name}` placeholder templates.
//!
//! Substitution is a single pass over the parsed skeleton: values are never
//! re-scanned, so user text that happens to contain `${...}` is emitted as is.

use std::collections::BTreeMap;

use crate::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
	Literal(&'a str),
	Placeholder(&'a str),
}

/// A parsed skeleton.
#[derive(Debug, Clone)]
pub struct Template<'a> {
	segments: Vec<Segment<'a>>,
}

/// Output of [`Template::expand`] with late-bound placeholders still in place.
#[derive(Debug, Clone)]
pub struct Expansion<'a> {
	text: String,
	/// Byte offset and name of every late placeholder left verbatim in `text`.
	late: Vec<(usize, &'a str)>,
}

impl<'a> Template<'a> {
	/// Parses `source`, failing on malformed placeholders.
	pub fn parse(source: &'a str) -> Result<Self, TemplateError> {
		let mut segments = Vec::new();
		let mut rest = source;
		let mut offset = 0;

		while let Some(start) = rest.find("${") {
			if start > 0 {
				segments.push(Segment::Literal(&rest[..start]));
			}
			let after = &rest[start + 2..];
			let Some(end) = after.find('}') else {
				return Err(TemplateError::Unterminated { offset: offset + start });
			};
			let name = &after[..end];
			if !is_identifier(name) {
				return Err(TemplateError::Invalid {
					name: name.to_string(),
					offset: offset + start,
				});
			}
			segments.push(Segment::Placeholder(name));

			let consumed = start + 2 + end + 1;
			offset += consumed;
			rest = &rest[consumed..];
		}

		if !rest.is_empty() {
			segments.push(Segment::Literal(rest));
		}
		Ok(Self { segments })
	}

	/// Returns true if the template references `name` at least once.
	pub fn has(&self, name: &str) -> bool {
		self.placeholders().any(|p| p == name)
	}

	/// Iterates placeholder names in order of appearance (with repeats).
	pub fn placeholders(&self) -> impl Iterator<Item = &'a str> + '_ {
		self.segments.iter().filter_map(|segment| match segment {
			Segment::Placeholder(name) => Some(*name),
			Segment::Literal(_) => None,
		})
	}

	/// Substitutes `values`, leaving placeholders named in `late` verbatim.
	///
	/// # Errors
	///
	/// [`TemplateError::Unresolved`] if a placeholder is neither in `values` nor `late`.
	pub fn expand(&self, values: &BTreeMap<&str, String>, late: &[&str]) -> Result<Expansion<'a>, TemplateError> {
		let mut text = String::new();
		let mut late_positions = Vec::new();

		for segment in &self.segments {
			match *segment {
				Segment::Literal(literal) => text.push_str(literal),
				Segment::Placeholder(name) => {
					if let Some(value) = values.get(name) {
						text.push_str(value);
					} else if late.contains(&name) {
						late_positions.push((text.len(), name));
						text.push_str("${");
						text.push_str(name);
						text.push('}');
					} else {
						return Err(TemplateError::Unresolved { name: name.to_string() });
					}
				}
			}
		}

		Ok(Expansion { text, late: late_positions })
	}

	/// Substitutes `values` with no late placeholders.
	pub fn render(&self, values: &BTreeMap<&str, String>) -> Result<String, TemplateError> {
		self.expand(values, &[]).map(Expansion::into_text)
	}
}

impl<'a> Expansion<'a> {
	/// The expanded text, late placeholders included verbatim.
	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn into_text(self) -> String {
		self.text
	}

	/// Replaces every late placeholder with the value `resolve` returns for its name.
	pub fn stamp(&self, mut resolve: impl FnMut(&str) -> Option<String>) -> Result<String, TemplateError> {
		let mut out = String::with_capacity(self.text.len());
		let mut cursor = 0;

		for &(position, name) in &self.late {
			out.push_str(&self.text[cursor..position]);
			let value = resolve(name).ok_or_else(|| TemplateError::Unresolved { name: name.to_string() })?;
			out.push_str(&value);
			cursor = position + name.len() + 3;
		}
		out.push_str(&self.text[cursor..]);
		Ok(out)
	}
}

fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
