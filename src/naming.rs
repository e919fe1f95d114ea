//! Titles, queries and test-run ids.

use regex::Regex;

/// Characters the remote title index and test-run ids do not accept.
pub const ILLEGAL_CHARS: &str = "\\/.:*\"<>|~!@#$?%^&'()+`,=\t";

/// Replace every illegal character with a single space.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_CHARS.contains(c) { ' ' } else { c })
        .collect()
}

/// A wildcard title query: `title:"<text>*"`.
pub fn title_query(text: &str) -> String {
    format!("title:\"{}*\"", text)
}

/// An exact phrase query: `"<text>"`.
pub fn phrase_query(text: &str) -> String {
    format!("\"{}\"", text)
}

/// Requirement title for a `<test>` grouping, sanitized so the stored title
/// and the title query agree.
pub fn requirement_title(prefix: &str, test_name: &str) -> String {
    sanitize(&format!("{}{}", prefix, test_name))
}

/// Logical test key: `class.method`.
pub fn class_method(class_name: &str, method_name: &str) -> String {
    format!("{}.{}", class_name, method_name)
}

/// Split `pkg.Cls.method` into `("pkg.Cls", "method")`.
///
/// A title without a dot has an empty class part.
pub fn split_class_method(title: &str) -> (&str, &str) {
    title.rsplit_once('.').unwrap_or(("", title))
}

/// Remove a title prefix, if present.
pub fn strip_prefix<'a>(title: &'a str, prefix: &str) -> &'a str {
    title.strip_prefix(prefix).unwrap_or(title)
}

/// Base id used to look up earlier runs of a suite: `"{prefix} {suite} {suffix}"`.
///
/// Each part is sanitized; empty parts are left out.
pub fn base_testrun_id(prefix: &str, suite_name: &str, suffix: &str) -> String {
    [prefix, suite_name, suffix]
        .iter()
        .map(|part| sanitize(part).trim().to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The run number of `id` when it has the form `"{base} <n>"`.
pub fn run_number(base: &str, id: &str) -> Option<u64> {
    let pattern = Regex::new(&format!(r"^{} (\d+)$", regex::escape(base))).ok()?;
    pattern.captures(id)?.get(1)?.as_str().parse().ok()
}

/// Id for the next run after `latest`.
///
/// The id is always built from `base`: a latest id of `"{base} 7"` gives
/// `"{base} 8"`, anything else starts numbering at `"{base} 1"`.
pub fn next_testrun_id(base: &str, latest: Option<&str>) -> String {
    let n = latest.and_then(|id| run_number(base, id)).unwrap_or(0);
    format!("{} {}", base, n.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("GUI: Registration"), "GUI  Registration");
        assert_eq!(sanitize("a.b/c\td"), "a b c d");
        assert_eq!(sanitize("plain name"), "plain name");
    }

    #[test]
    fn test_queries() {
        assert_eq!(title_query("rhsm.cli.Foo"), "title:\"rhsm.cli.Foo*\"");
        assert_eq!(phrase_query("Smoke"), "\"Smoke\"");
    }

    #[test]
    fn test_split_class_method() {
        assert_eq!(
            split_class_method("rhsm.cli.tests.GeneralTests.someTest"),
            ("rhsm.cli.tests.GeneralTests", "someTest")
        );
        assert_eq!(split_class_method("lonely"), ("", "lonely"));
        assert_eq!(class_method("pkg.Cls", "dataTest"), "pkg.Cls.dataTest");
    }

    #[test]
    fn test_base_testrun_id() {
        assert_eq!(
            base_testrun_id("RHSM", "Tier1 Tests", "x86_64"),
            "RHSM Tier1 Tests x86_64"
        );
        assert_eq!(base_testrun_id("", "GUI: Smoke", ""), "GUI  Smoke");
    }

    #[test]
    fn test_next_testrun_id() {
        assert_eq!(next_testrun_id("RHSM Smoke", None), "RHSM Smoke 1");
        assert_eq!(
            next_testrun_id("RHSM Smoke", Some("RHSM Smoke 41")),
            "RHSM Smoke 42"
        );
        assert_eq!(
            next_testrun_id("RHSM Smoke", Some("RHSM Smoke nightly")),
            "RHSM Smoke 1"
        );
        assert_eq!(next_testrun_id("Smoke", Some("7")), "Smoke 1");
        assert_eq!(next_testrun_id("S", Some("A S 1")), "S 1");
        assert_eq!(next_testrun_id("S", Some("S 2 rerun")), "S 1");
        assert_eq!(
            next_testrun_id("S", Some(&format!("S {}", u64::MAX))),
            format!("S {}", u64::MAX)
        );
    }

    #[test]
    fn test_requirement_title() {
        assert_eq!(requirement_title("RHSM-REQ ", "GroupA"), "RHSM-REQ GroupA");
        assert_eq!(
            requirement_title("REQ: ", "GUI: Registration"),
            "REQ  GUI  Registration"
        );
    }

    #[test]
    fn test_run_number() {
        assert_eq!(run_number("RHSM Smoke", "RHSM Smoke 41"), Some(41));
        assert_eq!(run_number("S", "A S 1"), None);
        assert_eq!(run_number("S", "S1"), None);
        assert_eq!(run_number("a.b (x)", "a.b (x) 3"), Some(3));
        assert_eq!(run_number("a.b", "aXb 3"), None);
    }
}
