//! Constants for the chartmill server

// ============================================================================
// CONTENT TYPES
// ============================================================================

/// Content type of a served `index.yaml`.
pub const INDEX_CONTENT_TYPE: &str = "application/x-yaml";

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

// ============================================================================
// LIMITS
// ============================================================================

/// Largest accepted chart upload (20 MiB).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Capacity of the cache event channel when the index limit is unknown.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// PAGES
// ============================================================================

pub const WELCOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Welcome to chartmill!</title>
<style>
    body {
        width: 35em;
        margin: 0 auto;
        font-family: Tahoma, Verdana, Arial, sans-serif;
    }
</style>
</head>
<body>
<h1>Welcome to chartmill!</h1>
<p>If you see this page, the chart repository server is running.</p>
<p>Repository indexes are served at <code>&lt;repo&gt;/index.yaml</code>.</p>
</body>
</html>
"#;
