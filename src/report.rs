//! TestNG report reading.
//!
//! A `testng-results.xml` file has this shape (only the consumed attributes
//! are shown):
//!
//! ```xml
//! <testng-results>
//!   <suite name="Smoke">
//!     <test name="GUI: Registration">
//!       <class name="rhsm.gui.tests.RegisterTests">
//!         <test-method name="simpleRegister" status="FAIL" duration-ms="1520"
//!                      started-at="2016-01-01T00:00:00Z" data-provider="users">
//!           <params><param index="0"><value><![CDATA[admin]]></value></param></params>
//!           <exception class="java.lang.AssertionError">
//!             <message><![CDATA[expected true]]></message>
//!             <full-stacktrace><![CDATA[java.lang.AssertionError ...]]></full-stacktrace>
//!           </exception>
//!         </test-method>
//!       </class>
//!     </test>
//!   </suite>
//! </testng-results>
//! ```
//!
//! [`ReportReader`] loads the document (downloading it first when given an
//! `http(s)://` URL) into a small element tree, and [`Report::suites`] walks
//! it lazily, converting each `<suite>` into the typed [`Suite`] model.

pub mod exception;
pub mod model;
pub mod reader;

pub use exception::{extract_exception, strip_cdata};
pub use model::{Class, Element, Suite, Test, TestMethod};
pub use reader::{Report, ReportReader, ReportSource};

/// Result type for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors raised while loading or interpreting a report.
///
/// Every variant is fatal to a run; there is no partial import.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The report could not be downloaded.
    #[error("Failed to download report from {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The document is not well-formed XML.
    #[error("Malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// The document parsed but its structure is not a TestNG report.
    #[error("Unexpected report structure: {0}")]
    Structure(String),

    /// A required attribute is absent from an element.
    #[error("<{element}> is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    /// An attribute value could not be interpreted.
    #[error("Invalid value {value:?} for '{attribute}' on <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },

    /// I/O error reading the report or writing the downloaded copy.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
