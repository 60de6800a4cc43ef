//! Text-level parsing helpers shared by the HTML extractor and the XBRL
//! materializer: currency-unit tables, display-number parsing, account-title
//! canonicalization, and Korean-format date extraction.

pub mod dates;
pub mod numeric;
