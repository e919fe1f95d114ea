//! Failure metadata and data-provider parameter extraction.

use std::sync::OnceLock;

use regex::Regex;

use super::model::Element;
use crate::result::TestException;

/// Text used when a parameter or exception field has no content.
const NULL_TEXT: &str = "null";

fn cdata_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.+)\]\]>?").expect("CDATA pattern is valid"))
}

/// Strip a `<![CDATA[ ... ]]>` wrapper and surrounding whitespace.
///
/// The reader already unwraps real CDATA sections; this handles wrappers that
/// survive as literal text (e.g. escaped CDATA in a report produced by a
/// custom listener). Replacement characters left by lossy decoding are
/// dropped.
pub fn strip_cdata(value: &str) -> String {
    let inner = match cdata_pattern().captures(value) {
        Some(caps) => caps.get(1).map_or(value, |m| m.as_str()),
        None => value,
    };
    inner.trim().chars().filter(|c| *c != '\u{FFFD}').collect()
}

fn text_or_null(elem: &Element) -> String {
    if elem.text.is_empty() {
        NULL_TEXT.to_string()
    } else {
        strip_cdata(&elem.text)
    }
}

/// Extract the `<exception>` of a `<test-method>`, if any.
///
/// When several exception elements are present the last one wins.
pub fn extract_exception(test_method: &Element) -> Option<TestException> {
    let mut found = None;
    for exc in test_method.descendants_named("exception") {
        let mut exception = TestException {
            class_name: exc.attr("class").map(str::to_string),
            ..Default::default()
        };
        for child in &exc.children {
            match child.name.as_str() {
                "message" => exception.message = text_or_null(child),
                "full-stacktrace" => exception.stack_trace = text_or_null(child),
                _ => {}
            }
        }
        found = Some(exception);
    }
    found
}

/// Collect the stringified `<param><value>` arguments of a parameterized
/// invocation, in document order.
pub fn extract_params(test_method: &Element) -> Vec<String> {
    test_method
        .descendants_named("param")
        .into_iter()
        .flat_map(|param| param.children.iter())
        .map(text_or_null)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_text(name: &str, text: &str) -> Element {
        let mut elem = Element::new(name);
        elem.text = text.to_string();
        elem
    }

    #[test]
    fn test_strip_cdata() {
        assert_eq!(strip_cdata("<![CDATA[ boom ]]>"), "boom");
        assert_eq!(strip_cdata("  plain text "), "plain text");
        assert_eq!(strip_cdata("<![CDATA[line1\nline2]]>"), "line1\nline2");
        assert_eq!(strip_cdata("bad\u{FFFD}byte"), "badbyte");
    }

    #[test]
    fn test_extract_exception() {
        let mut exc = Element::new("exception");
        exc.attributes
            .push(("class".into(), "java.lang.AssertionError".into()));
        exc.children.push(with_text("message", "expected [true]"));
        exc.children
            .push(with_text("full-stacktrace", "<![CDATA[at Foo.bar(Foo.java:1)]]>"));

        let mut method = Element::new("test-method");
        method.children.push(exc);

        let exception = extract_exception(&method).unwrap();
        assert_eq!(
            exception.class_name.as_deref(),
            Some("java.lang.AssertionError")
        );
        assert_eq!(exception.message, "expected [true]");
        assert_eq!(exception.stack_trace, "at Foo.bar(Foo.java:1)");
    }

    #[test]
    fn test_no_exception() {
        let method = Element::new("test-method");
        assert!(extract_exception(&method).is_none());
    }

    #[test]
    fn test_extract_params() {
        let mut params = Element::new("params");
        for value in ["1", "", " two "] {
            let mut param = Element::new("param");
            param.children.push(with_text("value", value));
            params.children.push(param);
        }
        let mut method = Element::new("test-method");
        method.children.push(params);

        assert_eq!(extract_params(&method), vec!["1", "null", "two"]);
    }
}
