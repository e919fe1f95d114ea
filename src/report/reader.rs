//! Loading a TestNG report from a local path or a URL.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::model::{Element, Suite, suite_elements};
use super::{ReportError, ReportResult};

/// Where a report comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    /// A file on the local filesystem (`~` is expanded).
    Local(PathBuf),
    /// An `http://` or `https://` URL, downloaded before parsing.
    Remote(String),
}

impl ReportSource {
    pub fn parse(path_or_url: &str) -> Self {
        let trimmed = path_or_url.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ReportSource::Remote(trimmed.to_string())
        } else {
            ReportSource::Local(PathBuf::from(shellexpand::tilde(trimmed).as_ref()))
        }
    }
}

/// Opens a report and parses it into a traversable [`Report`].
///
/// # Example
///
/// ```no_run
/// use polarion_sync::report::ReportReader;
///
/// # async fn run() -> polarion_sync::report::ReportResult<()> {
/// let report = ReportReader::new("test-output/testng-results.xml").read().await?;
/// for suite in report.suites() {
///     println!("{}", suite?.name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReportReader {
    source: ReportSource,
}

impl ReportReader {
    pub fn new(path_or_url: &str) -> Self {
        Self {
            source: ReportSource::parse(path_or_url),
        }
    }

    pub fn source(&self) -> &ReportSource {
        &self.source
    }

    /// Read and parse the report, downloading it first if it is remote.
    ///
    /// A failed download aborts the read; no partial report is returned.
    pub async fn read(&self) -> ReportResult<Report> {
        match &self.source {
            ReportSource::Local(path) => Report::from_path(path),
            ReportSource::Remote(url) => {
                let downloaded = download(url).await?;
                Report::from_path(downloaded.path())
            }
        }
    }
}

/// Download `url` into a temporary file that lives as long as the handle.
async fn download(url: &str) -> ReportResult<NamedTempFile> {
    info!("Downloading report from {}", url);

    let to_error = |source| ReportError::Download {
        url: url.to_string(),
        source,
    };
    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(to_error)?;
    let body = response.bytes().await.map_err(to_error)?;

    let mut file = tempfile::Builder::new()
        .prefix("testng-results-")
        .suffix(".xml")
        .tempfile()?;
    file.write_all(&body)?;
    file.flush()?;

    debug!("Downloaded {} bytes to {}", body.len(), file.path().display());
    Ok(file)
}

/// A parsed report document.
#[derive(Debug, Clone)]
pub struct Report {
    root: Element,
}

impl Report {
    pub fn from_path(path: &Path) -> ReportResult<Self> {
        info!("Parsing report {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn parse_str(xml: &str) -> ReportResult<Self> {
        Self::from_reader(xml.as_bytes())
    }

    /// Parse a whole document. Malformed XML fails fast.
    pub fn from_reader<R: BufRead>(xml: R) -> ReportResult<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|source| ReportError::Xml {
                    position: reader.buffer_position() as u64,
                    source,
                })?;
            let position = reader.buffer_position() as u64;

            match event {
                Event::Start(e) => stack.push(open_element(&e, position)?),
                Event::Empty(e) => {
                    let elem = open_element(&e, position)?;
                    attach(&mut stack, &mut root, elem)?;
                }
                Event::End(_) => {
                    let elem = stack.pop().ok_or_else(|| {
                        ReportError::Structure(format!("unbalanced end tag at byte {}", position))
                    })?;
                    attach(&mut stack, &mut root, elem)?;
                }
                Event::Text(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&decode_escaped(&e));
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&decode(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(ReportError::Structure(format!(
                "document ended inside <{}>",
                open.name
            )));
        }

        let root = root.ok_or_else(|| ReportError::Structure("empty document".to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Lazily convert each `<suite>` element, in document order.
    pub fn suites(&self) -> impl Iterator<Item = ReportResult<Suite>> + '_ {
        suite_elements(&self.root)
            .into_iter()
            .map(Suite::from_element)
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    elem: Element,
) -> ReportResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elem);
    } else if root.is_none() {
        *root = Some(elem);
    } else {
        return Err(ReportError::Structure(format!(
            "unexpected second root element <{}>",
            elem.name
        )));
    }
    Ok(())
}

fn open_element(start: &BytesStart<'_>, position: u64) -> ReportResult<Element> {
    let mut elem = Element::new(decode(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|err| ReportError::Xml {
            position,
            source: quick_xml::Error::InvalidAttr(err),
        })?;
        let key = decode(attr.key.as_ref());
        elem.attributes.push((key, decode_escaped(&attr.value)));
    }
    Ok(elem)
}

/// Decode bytes as UTF-8, discarding invalid sequences.
fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

/// Decode and unescape XML entities. Text with a broken entity is kept raw.
fn decode_escaped(bytes: &[u8]) -> String {
    let text = decode(bytes);
    match quick_xml::escape::unescape(&text) {
        Ok(Cow::Owned(unescaped)) => unescaped,
        Ok(Cow::Borrowed(_)) | Err(_) => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Status;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<testng-results skipped="0" failed="1" total="3" passed="2">
  <reporter-output/>
  <suite name="Smoke" duration-ms="4000">
    <test name="GUI: Registration">
      <class name="rhsm.gui.tests.RegisterTests">
        <test-method status="PASS" is-config="true" name="setUp" duration-ms="10"
                     started-at="2016-01-01T00:00:00Z"/>
        <test-method status="PASS" name="dataTest" duration-ms="100"
                     started-at="2016-01-01T00:00:01Z" data-provider="dp">
          <params>
            <param index="0"><value><![CDATA[alpha]]></value></param>
            <param index="1"><value is-null="true"></value></param>
          </params>
        </test-method>
        <test-method status="FAIL" name="register" duration-ms="2000"
                     started-at="2016-01-01T00:00:02Z" description="A &amp; B">
          <exception class="java.lang.AssertionError">
            <message><![CDATA[expected [true] but found [false]]]></message>
            <full-stacktrace><![CDATA[java.lang.AssertionError: boom
	at rhsm.gui.tests.RegisterTests.register(RegisterTests.java:42)]]></full-stacktrace>
          </exception>
        </test-method>
      </class>
    </test>
  </suite>
</testng-results>
"#;

    #[test]
    fn test_source_detection() {
        assert_eq!(
            ReportSource::parse("https://ci.example.com/job/1/testng-results.xml"),
            ReportSource::Remote("https://ci.example.com/job/1/testng-results.xml".into())
        );
        assert_eq!(
            ReportSource::parse("test-output/testng-results.xml"),
            ReportSource::Local(PathBuf::from("test-output/testng-results.xml"))
        );
    }

    #[test]
    fn test_parse_sample() {
        let report = Report::parse_str(SAMPLE).unwrap();
        let suites: Vec<Suite> = report.suites().collect::<ReportResult<_>>().unwrap();
        assert_eq!(suites.len(), 1);

        let suite = &suites[0];
        assert_eq!(suite.name, "Smoke");
        assert_eq!(suite.tests[0].name, "GUI: Registration");

        let class = &suite.tests[0].classes[0];
        assert_eq!(class.name, "rhsm.gui.tests.RegisterTests");
        assert_eq!(class.methods.len(), 3);
        assert!(class.methods[0].is_config);

        let data = &class.methods[1];
        assert_eq!(data.data_provider.as_deref(), Some("dp"));
        assert_eq!(data.params, vec!["alpha", "null"]);

        let failed = &class.methods[2];
        assert_eq!(failed.status, Status::Fail);
        assert_eq!(failed.description.as_deref(), Some("A & B"));
        let exception = failed.exception.as_ref().unwrap();
        assert_eq!(exception.message, "expected [true] but found [false]");
        assert!(exception.stack_trace.starts_with("java.lang.AssertionError: boom"));
        assert!(exception.stack_trace.contains("RegisterTests.java:42"));
    }

    #[test]
    fn test_parse_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let report = Report::from_path(file.path()).unwrap();
        assert_eq!(report.root().name, "testng-results");
        assert_eq!(report.suites().count(), 1);
    }

    #[test]
    fn test_malformed_xml_fails() {
        let err = Report::parse_str("<suite name=\"x\"><test></suite>").unwrap_err();
        assert!(matches!(err, ReportError::Xml { .. }), "got {err:?}");
    }

    #[test]
    fn test_truncated_document_fails() {
        let err = Report::parse_str("<testng-results><suite name=\"x\">").unwrap_err();
        assert!(
            matches!(err, ReportError::Structure(_) | ReportError::Xml { .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn test_empty_document_fails() {
        assert!(matches!(
            Report::parse_str(""),
            Err(ReportError::Structure(_))
        ));
    }

    #[test]
    fn test_missing_suite_name_surfaces_lazily() {
        let report = Report::parse_str("<testng-results><suite/></testng-results>").unwrap();
        let first = report.suites().next().unwrap();
        assert!(matches!(first, Err(ReportError::MissingAttribute { .. })));
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let reader = ReportReader::new("/nonexistent/testng-results.xml");
        let result = reader.read().await;
        assert!(matches!(result, Err(ReportError::Io(_))));
    }

    #[tokio::test]
    async fn test_download_failure_is_fatal() {
        let reader = ReportReader::new("http://127.0.0.1:9/testng-results.xml");
        let result = reader.read().await;
        assert!(matches!(result, Err(ReportError::Download { .. })));
    }
}
