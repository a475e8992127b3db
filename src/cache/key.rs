//! Deterministic cache keys derived from an operation name and its arguments.

// std
use std::io::{self, Write};
// crates.io
use md5::{Digest, Md5};
use serde_json::{Map, Value, ser::Formatter as JsonFormatter};
// self
use crate::_prelude::*;

/// Positional and named arguments of a cacheable call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallArgs {
	positional: Vec<Value>,
	named: BTreeMap<String, Value>,
}
impl CallArgs {
	/// Creates an empty argument list.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a positional argument.
	pub fn arg(mut self, value: impl Into<Value>) -> Self {
		self.positional.push(value.into());

		self
	}

	/// Sets a named argument, replacing an earlier value with the same name.
	pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.named.insert(name.into(), value.into());

		self
	}

	/// Appends any serializable positional argument.
	pub fn try_arg<T>(self, value: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		Ok(self.arg(serde_json::to_value(value)?))
	}

	/// Sets any serializable named argument.
	pub fn try_named<T>(self, name: impl Into<String>, value: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		Ok(self.named(name, serde_json::to_value(value)?))
	}

	/// Positional arguments in call order.
	pub fn positional(&self) -> &[Value] {
		&self.positional
	}

	/// Named arguments sorted by name.
	pub fn named_args(&self) -> &BTreeMap<String, Value> {
		&self.named
	}
}

/// Namespaced cache key of the form `<namespace>:<operation>:<digest>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);
impl CacheKey {
	/// Returns the key as stored in the shared store.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for CacheKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Derives the cache key for `operation` called with `args`.
///
/// Named arguments listed in `excluded` (transport handles and the like) do not contribute.
/// Object keys are sorted at every depth before hashing, so logically equal inputs map to
/// the same key regardless of insertion order. The digest is the lowercase hex MD5 of the
/// canonical JSON `{"args": [...], "kwargs": {...}}`, rendered byte for byte like Python's
/// `json.dumps(params, sort_keys=True)` so keys stay shared with existing deployments.
pub fn compute_key(
	namespace: &str,
	operation: &str,
	args: &CallArgs,
	excluded: &[String],
) -> CacheKey {
	let kwargs = args
		.named
		.iter()
		.filter(|(name, _)| !excluded.iter().any(|skip| skip == *name))
		.map(|(name, value)| (name.clone(), canonicalize(value)))
		.collect::<Map<String, Value>>();
	let positional = args.positional.iter().map(canonicalize).collect::<Vec<_>>();
	let mut material = Map::new();

	material.insert("args".into(), Value::Array(positional));
	material.insert("kwargs".into(), Value::Object(kwargs));

	let digest = Md5::digest(canonical_json(&Value::Object(material)));

	CacheKey(format!("{namespace}:{operation}:{digest:x}"))
}

/// `json.dumps` default layout: `", "` and `": "` separators, non-ASCII escaped as `\uXXXX`.
struct DumpsFormatter;
impl JsonFormatter for DumpsFormatter {
	fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
	where
		W: ?Sized + Write,
	{
		if first { Ok(()) } else { writer.write_all(b", ") }
	}

	fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
	where
		W: ?Sized + Write,
	{
		if first { Ok(()) } else { writer.write_all(b", ") }
	}

	fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
	where
		W: ?Sized + Write,
	{
		writer.write_all(b": ")
	}

	fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
	where
		W: ?Sized + Write,
	{
		let mut start = 0;

		for (idx, ch) in fragment.char_indices() {
			if ch.is_ascii() {
				continue;
			}

			writer.write_all(&fragment.as_bytes()[start..idx])?;

			let mut units = [0; 2];

			for unit in ch.encode_utf16(&mut units).iter() {
				write!(writer, "\\u{unit:04x}")?;
			}

			start = idx + ch.len_utf8();
		}

		writer.write_all(&fragment.as_bytes()[start..])
	}
}

fn canonical_json(value: &Value) -> Vec<u8> {
	let mut buf = Vec::new();
	let mut serializer = serde_json::Serializer::with_formatter(&mut buf, DumpsFormatter);

	if let Err(e) = value.serialize(&mut serializer) {
		tracing::warn!(error = %e, "cache key material fell back to compact JSON");

		return value.to_string().into_bytes();
	}

	buf
}

fn canonicalize(value: &Value) -> Value {
	match value {
		Value::Object(map) => {
			let mut entries = map.iter().collect::<Vec<_>>();

			entries.sort_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs));

			Value::Object(
				entries.into_iter().map(|(name, value)| (name.clone(), canonicalize(value))).collect(),
			)
		},
		Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
		other => other.clone(),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn excluded() -> Vec<String> {
		vec!["request".into()]
	}

	#[test]
	fn named_argument_order_does_not_matter() {
		let lhs = CallArgs::new().named("query", "a").named("page", 1);
		let rhs = CallArgs::new().named("page", 1).named("query", "a");
		let other_page = CallArgs::new().named("query", "a").named("page", 2);

		assert_eq!(
			compute_key("cache", "search", &lhs, &excluded()),
			compute_key("cache", "search", &rhs, &excluded())
		);
		assert_ne!(
			compute_key("cache", "search", &lhs, &excluded()),
			compute_key("cache", "search", &other_page, &excluded())
		);
	}

	#[test]
	fn nested_objects_are_canonicalized() {
		let lhs = CallArgs::new().arg(json!({ "b": 1, "a": { "y": true, "x": [1, 2] } }));
		let rhs = CallArgs::new().arg(json!({ "a": { "x": [1, 2], "y": true }, "b": 1 }));

		assert_eq!(
			compute_key("cache", "op", &lhs, &excluded()),
			compute_key("cache", "op", &rhs, &excluded())
		);
	}

	#[test]
	fn excluded_parameters_do_not_contribute() {
		let plain = CallArgs::new().named("query", "a");
		let with_request = plain.clone().named("request", "handle-123");

		assert_eq!(
			compute_key("cache", "search", &plain, &excluded()),
			compute_key("cache", "search", &with_request, &excluded())
		);
		assert_ne!(
			compute_key("cache", "search", &plain, &[]),
			compute_key("cache", "search", &with_request, &[])
		);
	}

	#[test]
	fn keys_are_namespaced_by_operation() {
		let args = CallArgs::new().arg("x");
		let search = compute_key("cache", "search", &args, &excluded());
		let categories = compute_key("cache", "categories", &args, &excluded());

		assert!(search.as_str().starts_with("cache:search:"));
		assert!(categories.as_str().starts_with("cache:categories:"));
		assert_ne!(search, categories);
		assert_eq!(search.as_str(), "cache:search:a37150efd564ec7ae3af9ad7625187a0");

		let digest = search.as_str().trim_start_matches("cache:search:");

		assert_eq!(digest.len(), 32);
		assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
	}

	#[test]
	fn keys_match_python_json_dumps_layout() {
		let args = CallArgs::new()
			.named("query", "café")
			.named("page", 2)
			.named("request", "handle-123");
		let nested = CallArgs::new().arg(json!({ "b": 1, "a": { "y": true, "x": [1, 2] } }));

		assert_eq!(
			canonical_json(&json!({ "args": [], "kwargs": { "page": 2, "query": "café" } })),
			br#"{"args": [], "kwargs": {"page": 2, "query": "caf\u00e9"}}"#
		);
		assert_eq!(
			compute_key("cache", "search_prompts", &args, &excluded()).as_str(),
			"cache:search_prompts:c0fdb19decb91cb856dcfd80fd93575f"
		);
		assert_eq!(
			compute_key("cache", "op", &nested, &excluded()).as_str(),
			"cache:op:16741e8a8801ecb7e3cbd47931fb397a"
		);
	}

	#[test]
	fn positional_order_matters() {
		let ab = CallArgs::new().arg("a").arg("b");
		let ba = CallArgs::new().arg("b").arg("a");

		assert_ne!(
			compute_key("cache", "op", &ab, &excluded()),
			compute_key("cache", "op", &ba, &excluded())
		);
	}

	#[test]
	fn try_arg_accepts_serializable_values() {
		#[derive(Serialize)]
		struct Filter {
			category: &'static str,
		}

		let args = CallArgs::new()
			.try_named("filter", &Filter { category: "coding" })
			.expect("Serializable arguments should convert.");

		assert_eq!(args.named_args()["filter"], json!({ "category": "coding" }));
	}
}
