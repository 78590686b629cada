use apollo_compiler::ast::NamedType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Schema;

pub(crate) fn is_composite_type(schema: &Schema, ty: &NamedType) -> bool {
    matches!(
        schema.types.get(ty),
        Some(
            ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_)
        )
    )
}

pub(crate) fn is_object_type(schema: &Schema, ty: &NamedType) -> bool {
    matches!(schema.types.get(ty), Some(ExtendedType::Object(_)))
}

pub(crate) fn is_abstract_type(schema: &Schema, ty: &NamedType) -> bool {
    matches!(
        schema.types.get(ty),
        Some(ExtendedType::Interface(_) | ExtendedType::Union(_))
    )
}

// https://github.com/graphql/graphql-js/blob/7b3241329e1ff49fb647b043b80568f0cf9e1a7c/src/type/introspection.js#L500-L509
pub(crate) fn is_introspection_type(name: &str) -> bool {
    name == "__Schema"
        || name == "__Directive"
        || name == "__DirectiveLocation"
        || name == "__Type"
        || name == "__Field"
        || name == "__InputValue"
        || name == "__EnumValue"
        || name == "__TypeKind"
}

/// Re-prints a GraphQL document with every ignored character removed.
///
/// A single space is kept only where dropping it would merge two tokens:
/// between adjacent non-punctuator tokens (names, numbers, strings), and
/// before a spread that follows a non-punctuator. Commas, line terminators,
/// and comments are dropped entirely. The serializer only emits non-ASCII
/// bytes inside string values, which are copied verbatim.
pub(crate) fn strip_ignored_characters(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut last_was_non_punctuator = false;
    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\r' | b'\n' | b',' => {
                i += 1;
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\r' && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'"' => {
                let start = i;
                if bytes[i..].starts_with(b"\"\"\"") {
                    i += 3;
                    while i < bytes.len() && !bytes[i..].starts_with(b"\"\"\"") {
                        if bytes[i] == b'\\' && bytes[i..].starts_with(b"\\\"\"\"") {
                            i += 4;
                        } else {
                            i += 1;
                        }
                    }
                    i = (i + 3).min(bytes.len());
                } else {
                    i += 1;
                    while i < bytes.len() && bytes[i] != b'"' {
                        if bytes[i] == b'\\' {
                            i += 2;
                        } else {
                            i += 1;
                        }
                    }
                    i = (i + 1).min(bytes.len());
                }
                if last_was_non_punctuator {
                    out.push(' ');
                }
                out.push_str(&source[start..i]);
                last_was_non_punctuator = true;
            }
            b'.' if bytes[i..].starts_with(b"...") => {
                if last_was_non_punctuator {
                    out.push(' ');
                }
                out.push_str("...");
                i += 3;
                last_was_non_punctuator = false;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                if last_was_non_punctuator {
                    out.push(' ');
                }
                out.push_str(&source[start..i]);
                last_was_non_punctuator = true;
            }
            c if c.is_ascii_digit() || c == b'-' => {
                let start = i;
                i += 1;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric()
                        || bytes[i] == b'.'
                        || bytes[i] == b'-'
                        || bytes[i] == b'+')
                {
                    i += 1;
                }
                if last_was_non_punctuator {
                    out.push(' ');
                }
                out.push_str(&source[start..i]);
                last_was_non_punctuator = true;
            }
            _ => {
                let c = source[i..].chars().next().unwrap_or('\u{fffd}');
                out.push(c);
                i += c.len_utf8();
                last_was_non_punctuator = false;
            }
        }
    }
    out
}
