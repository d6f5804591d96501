//! Test fixtures for common test data
//!
//! HTML documents served by the mock upstream in webfetch tests.

/// Minimal page with a title, heading and paragraph
pub const EXAMPLE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Example Domain</title>
</head>
<body>
    <h1>Example Heading</h1>
    <p>This domain is for use in illustrative examples in documents.</p>
    <p>Read <a href="https://example.com/more">more information</a> here.</p>
</body>
</html>
"#;

/// Page carrying Open Graph metadata and a favicon link
pub const PAGE_WITH_METADATA: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Metadata Rich Page</title>
    <meta property="og:image" content="https://cdn.example.com/social.png">
    <meta property="og:description" content="A page used to exercise metadata extraction.">
    <link rel="shortcut icon" href="/favicon.ico">
</head>
<body>
    <p>Body content.</p>
</body>
</html>
"#;

/// Page whose only image hint is a relative favicon link
pub const ICON_ONLY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Icon Fallback</title>
    <link rel="icon" href="/favicon.ico">
</head>
<body>
    <p>Nothing else here.</p>
</body>
</html>
"#;

/// Well-formed JSON payload served with a non-HTML content type
pub const JSON_DOCUMENT: &str = r#"{"service":"inventory","items":[1,2,3]}"#;
