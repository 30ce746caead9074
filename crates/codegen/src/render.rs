//! Merging a [`CodeSpec`] into a family skeleton.

use std::collections::BTreeMap;

use tracing::trace;

use crate::digest::ContentDigest;
use crate::error::TemplateError;
use crate::spec::CodeSpec;
use crate::template::Template;

/// Placeholder stamped with the content digest after hashing.
const DIGEST: &str = "digest";

/// Placeholders every family skeleton must contain.
pub const REQUIRED_PLACEHOLDERS: &[&str] = &["codeInclude", "localCode", "code", DIGEST];

/// Identifies a component family for code generation.
#[derive(Debug)]
pub struct FamilyDescriptor {
	/// Family name, matching the registry namespace.
	pub name: &'static str,
	/// Operations of the abstract interface, for diagnostics and docs.
	pub operations: &'static [&'static str],
	/// Skeleton text with `${...}` placeholders.
	pub skeleton: &'static str,
}

/// A compilable unit derived from a [`CodeSpec`] and a [`FamilyDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSource {
	family: &'static str,
	declared: String,
	text: String,
	digest: ContentDigest,
}

impl RenderedSource {
	pub fn family(&self) -> &'static str {
		self.family
	}

	/// The configuration entry's declared type name.
	pub fn declared_type(&self) -> &str {
		&self.declared
	}

	pub fn text(&self) -> &str {
		&self.text
	}

	pub fn digest(&self) -> &ContentDigest {
		&self.digest
	}

	/// Unique registry name for this entry's component.
	pub fn type_name(&self) -> String {
		synthesized_type_name(&self.declared, &self.digest)
	}
}

/// Renders `spec` into the skeleton of `family`.
///
/// `toolchain` identifies the compiler, flags and host ABI; it lands in the
/// unit's header comment and therefore in the digest.
///
/// The digest covers the expansion with every `${digest}` still verbatim and is
/// then stamped into those positions, so the final text is a function of the
/// hashed bytes alone.
pub fn render(family: &FamilyDescriptor, spec: &CodeSpec, toolchain: &str) -> Result<RenderedSource, TemplateError> {
	let template = Template::parse(family.skeleton)?;
	for &name in REQUIRED_PLACEHOLDERS {
		if !template.has(name) {
			return Err(TemplateError::Missing { family: family.name, name });
		}
	}

	let values = BTreeMap::from([
		("family", family.name.to_string()),
		("toolchain", comment_safe(toolchain)),
		("codeInclude", spec.code_include.clone()),
		("localCode", spec.local_code.clone()),
		("code", spec.code.clone()),
		("verbose", if spec.verbose { "1" } else { "0" }.to_string()),
	]);

	let expansion = template.expand(&values, &[DIGEST])?;
	let digest = ContentDigest::of(expansion.text());
	let text = expansion.stamp(|_| Some(digest.to_string()))?;

	trace!(family = family.name, declared = %spec.type_name, digest = digest.short(), bytes = text.len(), "Rendered dynamic code");

	Ok(RenderedSource {
		family: family.name,
		declared: spec.type_name.clone(),
		text,
		digest,
	})
}

/// Registry name for a declared type: the declared name made identifier-safe,
/// suffixed with the digest.
pub fn synthesized_type_name(declared: &str, digest: &ContentDigest) -> String {
	let safe: String = declared.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
	format!("{safe}_{digest}")
}

/// Exported probe confirming a loaded library was built from this digest.
pub fn marker_symbol(digest: &ContentDigest) -> String {
	format!("kiln_marker_{digest}")
}

/// Exported registration entry point of a generated unit.
pub fn entry_symbol(digest: &ContentDigest) -> String {
	format!("kiln_entry_{digest}")
}

fn comment_safe(text: &str) -> String {
	text.replace("*/", "* /").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	static FAMILY: FamilyDescriptor = FamilyDescriptor {
		name: "scalar",
		operations: &["value"],
		skeleton: "/* ${toolchain} */\n${codeInclude}\n${localCode}\nvoid kiln_marker_${digest}(int load) {}\ndouble f(double t) { if (${verbose}) {} ${code} }\n",
	};

	#[test]
	fn test_render_is_deterministic() {
		let spec = CodeSpec::new("ramp", "return 2.0 * t;").with_local_code("static int k;");
		let a = render(&FAMILY, &spec, "cc 1").unwrap();
		let b = render(&FAMILY, &spec, "cc 1").unwrap();
		assert_eq!(a, b);
		assert_eq!(a.text(), b.text());
		assert_eq!(a.digest(), b.digest());
	}

	#[test]
	fn test_digest_is_stamped_into_symbols() {
		let rendered = render(&FAMILY, &CodeSpec::new("x", "return 42;"), "cc 1").unwrap();
		assert!(rendered.text().contains(&marker_symbol(rendered.digest())));
		assert!(!rendered.text().contains("${"));
	}

	#[test]
	fn test_declared_name_does_not_affect_digest() {
		let a = render(&FAMILY, &CodeSpec::new("inletA", "return 1;"), "cc 1").unwrap();
		let b = render(&FAMILY, &CodeSpec::new("inletB", "return 1;"), "cc 1").unwrap();
		assert_eq!(a.digest(), b.digest());
		assert_eq!(a.text(), b.text());
		assert_ne!(a.type_name(), b.type_name());
	}

	#[test]
	fn test_fragments_and_toolchain_change_digest() {
		let base = render(&FAMILY, &CodeSpec::new("x", "return 1;"), "cc 1").unwrap();
		let code = render(&FAMILY, &CodeSpec::new("x", "return 2;"), "cc 1").unwrap();
		let verbose = render(&FAMILY, &CodeSpec::new("x", "return 1;").with_verbose(true), "cc 1").unwrap();
		let toolchain = render(&FAMILY, &CodeSpec::new("x", "return 1;"), "cc 2").unwrap();

		assert_ne!(base.digest(), code.digest());
		assert_ne!(base.digest(), verbose.digest());
		assert_ne!(base.digest(), toolchain.digest());
	}

	#[test]
	fn test_missing_required_placeholder() {
		static BROKEN: FamilyDescriptor = FamilyDescriptor {
			name: "broken",
			operations: &[],
			skeleton: "${codeInclude} ${localCode} ${digest}",
		};
		let err = render(&BROKEN, &CodeSpec::new("x", "return 1;"), "cc").unwrap_err();
		assert_eq!(err, TemplateError::Missing { family: "broken", name: "code" });
	}

	#[test]
	fn test_unknown_skeleton_placeholder() {
		static BROKEN: FamilyDescriptor = FamilyDescriptor {
			name: "broken",
			operations: &[],
			skeleton: "${codeInclude} ${localCode} ${digest} ${code} ${FieldType}",
		};
		let err = render(&BROKEN, &CodeSpec::new("x", "return 1;"), "cc").unwrap_err();
		assert_eq!(err, TemplateError::Unresolved { name: "FieldType".into() });
	}

	#[test]
	fn test_toolchain_cannot_close_comment() {
		let rendered = render(&FAMILY, &CodeSpec::new("x", "return 1;"), "evil */ int x;\nnext").unwrap();
		assert!(rendered.text().starts_with("/* evil * / int x; next */"));
	}

	#[test]
	fn test_synthesized_type_name_is_identifier_safe() {
		let digest = ContentDigest::of("x");
		assert_eq!(synthesized_type_name("inlet-ramp.v2", &digest), format!("inlet_ramp_v2_{digest}"));
	}
}
