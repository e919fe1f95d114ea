//! Report tree: a generic element tree and the typed TestNG model built on it.

use crate::result::{IterationResult, Status, now_timestamp};

use super::exception::{extract_exception, extract_params};
use super::{ReportError, ReportResult};

const TAG_SUITE: &str = "suite";
const TAG_TEST: &str = "test";
const TAG_CLASS: &str = "class";
const TAG_TEST_METHOD: &str = "test-method";

/// A parsed XML element.
///
/// Text and CDATA content directly inside the element are concatenated into
/// `text`; attribute values and text are already unescaped and decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Look up an attribute value by name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Look up an attribute that must be present.
    pub fn required_attr(&self, key: &str) -> ReportResult<&str> {
        self.attr(key).ok_or_else(|| ReportError::MissingAttribute {
            element: self.name.clone(),
            attribute: key.to_string(),
        })
    }

    /// Direct children with the given tag name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// This element and all of its descendants with the given tag name,
    /// in document order.
    pub fn descendants_named<'a>(&'a self, name: &'a str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        collect_named(self, name, &mut found);
        found
    }
}

fn collect_named<'a>(elem: &'a Element, name: &str, found: &mut Vec<&'a Element>) {
    if elem.name == name {
        found.push(elem);
    }
    for child in &elem.children {
        collect_named(child, name, found);
    }
}

/// A `<suite>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    pub name: String,
    pub tests: Vec<Test>,
}

/// A `<test>` element: a named logical grouping of classes.
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub name: String,
    pub classes: Vec<Class>,
}

/// A `<class>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    /// Fully qualified class name.
    pub name: String,
    /// Test methods in document order. Contiguity matters for merging.
    pub methods: Vec<TestMethod>,
}

/// A `<test-method>` element: one invocation of a test or configuration method.
#[derive(Debug, Clone, PartialEq)]
pub struct TestMethod {
    pub name: String,
    pub status: Status,
    pub duration_ms: u64,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub description: Option<String>,
    pub signature: Option<String>,
    /// Configuration methods (`@BeforeClass` etc.) are never test results.
    pub is_config: bool,
    /// Name of the data provider, present on parameterized invocations.
    pub data_provider: Option<String>,
    pub params: Vec<String>,
    pub exception: Option<crate::result::TestException>,
}

impl Suite {
    pub fn from_element(elem: &Element) -> ReportResult<Self> {
        let name = elem.required_attr("name")?.to_string();
        let tests = elem
            .children_named(TAG_TEST)
            .map(Test::from_element)
            .collect::<ReportResult<Vec<_>>>()?;
        Ok(Self { name, tests })
    }

    /// Every test method in this suite, in document order.
    pub fn test_methods(&self) -> impl Iterator<Item = (&Test, &Class, &TestMethod)> {
        self.tests.iter().flat_map(|test| {
            test.classes.iter().flat_map(move |class| {
                class.methods.iter().map(move |method| (test, class, method))
            })
        })
    }
}

impl Test {
    pub fn from_element(elem: &Element) -> ReportResult<Self> {
        let name = elem.required_attr("name")?.to_string();
        let classes = elem
            .children_named(TAG_CLASS)
            .map(Class::from_element)
            .collect::<ReportResult<Vec<_>>>()?;
        Ok(Self { name, classes })
    }
}

impl Class {
    pub fn from_element(elem: &Element) -> ReportResult<Self> {
        let name = elem.required_attr("name")?.to_string();
        let methods = elem
            .children_named(TAG_TEST_METHOD)
            .map(TestMethod::from_element)
            .collect::<ReportResult<Vec<_>>>()?;
        Ok(Self { name, methods })
    }
}

impl TestMethod {
    pub fn from_element(elem: &Element) -> ReportResult<Self> {
        let name = elem.required_attr("name")?.to_string();

        let raw_status = elem.required_attr("status")?;
        let status = raw_status
            .parse::<Status>()
            .map_err(|_| invalid(elem, "status", raw_status))?;

        let raw_duration = elem.required_attr("duration-ms")?;
        let duration_ms = raw_duration
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(elem, "duration-ms", raw_duration))?;

        let data_provider = elem.attr("data-provider").map(str::to_string);
        let params = if data_provider.is_some() {
            extract_params(elem)
        } else {
            Vec::new()
        };

        Ok(Self {
            name,
            status,
            duration_ms,
            started_at: elem.attr("started-at").map(str::to_string),
            finished_at: elem.attr("finished-at").map(str::to_string),
            description: elem.attr("description").map(str::to_string),
            signature: elem.attr("signature").map(str::to_string),
            is_config: elem.attr("is-config").is_some_and(|v| v.trim() == "true"),
            data_provider,
            params,
            exception: extract_exception(elem),
        })
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Build the iteration result for a parameterized invocation.
    ///
    /// Returns `None` for methods without a data provider; their attributes
    /// are read directly instead.
    pub fn iteration_result(&self) -> Option<IterationResult> {
        self.data_provider.as_ref()?;
        Some(IterationResult::new(
            self.status,
            self.duration_secs(),
            self.started_at.clone().unwrap_or_else(now_timestamp),
            self.exception.clone(),
            self.params.clone(),
        ))
    }
}

fn invalid(elem: &Element, attribute: &str, value: &str) -> ReportError {
    ReportError::InvalidAttribute {
        element: elem.name.clone(),
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

/// Every `<suite>` element at or below `root`.
pub(crate) fn suite_elements(root: &Element) -> Vec<&Element> {
    root.descendants_named(TAG_SUITE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method_elem(attrs: &[(&str, &str)]) -> Element {
        let mut elem = Element::new("test-method");
        elem.attributes = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        elem
    }

    #[test]
    fn test_method_from_element() {
        let elem = method_elem(&[
            ("name", "simpleRegister"),
            ("status", "FAIL"),
            ("duration-ms", "1520"),
            ("started-at", "2016-01-01T00:00:00Z"),
            ("description", "registers"),
        ]);
        let method = TestMethod::from_element(&elem).unwrap();
        assert_eq!(method.name, "simpleRegister");
        assert_eq!(method.status, Status::Fail);
        assert_eq!(method.duration_ms, 1520);
        assert!((method.duration_secs() - 1.52).abs() < f64::EPSILON);
        assert!(!method.is_config);
        assert!(method.iteration_result().is_none());
    }

    #[test]
    fn test_method_missing_status() {
        let elem = method_elem(&[("name", "x"), ("duration-ms", "1")]);
        let err = TestMethod::from_element(&elem).unwrap_err();
        assert!(matches!(
            err,
            ReportError::MissingAttribute { ref attribute, .. } if attribute == "status"
        ));
    }

    #[test]
    fn test_method_invalid_duration() {
        let elem = method_elem(&[("name", "x"), ("status", "PASS"), ("duration-ms", "fast")]);
        assert!(matches!(
            TestMethod::from_element(&elem),
            Err(ReportError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_iteration_result_for_data_provider() {
        let elem = method_elem(&[
            ("name", "dataTest"),
            ("status", "PASS"),
            ("duration-ms", "250"),
            ("started-at", "2016-01-01T00:00:05Z"),
            ("data-provider", "dp"),
        ]);
        let method = TestMethod::from_element(&elem).unwrap();
        let iteration = method.iteration_result().unwrap();
        assert_eq!(iteration.status(), Status::Pass);
        assert_eq!(iteration.started(), "2016-01-01T00:00:05Z");
        assert!((iteration.duration() - 0.25).abs() < f64::EPSILON);
        assert!(iteration.params().is_empty());
    }

    #[test]
    fn test_descendants_in_document_order() {
        let mut root = Element::new("testng-results");
        let mut first = Element::new("suite");
        first.attributes.push(("name".into(), "a".into()));
        let mut second = Element::new("suite");
        second.attributes.push(("name".into(), "b".into()));
        root.children.push(first);
        root.children.push(second);

        let names: Vec<_> = suite_elements(&root)
            .into_iter()
            .filter_map(|e| e.attr("name"))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
