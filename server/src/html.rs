//! HTML bodies served by the generic endpoint and the unknown-method
//! responder.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;

/// Closing fragment of the index page, written as the final frame part.
pub(crate) const INDEX_TAIL: &[u8] = b"</body></html>\n";

/// Render the one-shot index page for a non-stream generic call.
///
/// The page subscribes to `/stream` via `EventSource`, shows the latest
/// frame, and counts missed messages client-side. The trailing
/// "Ignore these: " lead-in is completed by the timing line appended as
/// the next frame part.
pub(crate) fn render_index(method: &str) -> Bytes {
    static COUNT: AtomicUsize = AtomicUsize::new(0);
    let count = COUNT.fetch_add(1, Ordering::Relaxed);
    Bytes::from(format!(
        "<html><head><link rel=icon href=\"data:,\"></head>\
         <body>Server stream:\
         <pre>letter  msg# #calls    elapsed pub-to-write dead-after-pub</pre>\
         <pre id=stream>&nbsp;</pre>\
         Missed messages: <span id=missed>&nbsp;</span>.\
         <script>\
         var elem0 = document.getElementById('stream');\
         var elem1 = document.getElementById('missed');\
         var src = new EventSource('/stream');\
         var count = -1; var missed = 0;\
         src.onmessage = function(event) {{ elem0.textContent = event.data;\
         var c = parseInt(event.data.substring(1, 12));\
         if (count != -1) missed += Math.abs(c - 1 - count);\
         count = c; elem1.textContent = missed; }};\
         </script>\
         Method: {method}. Count: {count}. Ignore these: "
    ))
}

/// Render the diagnostic body naming a method nobody serves.
pub(crate) fn render_unknown(method: &str) -> Bytes {
    Bytes::from(format!(
        "<html><body>Unknown method: {method}</body></html>\n"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_page_names_method_and_counts_up() {
        let first = render_index("/anything");
        let body = std::str::from_utf8(&first).unwrap();
        assert!(body.contains("Method: /anything. Count:"));
        assert!(body.contains("new EventSource('/stream')"));

        let second = render_index("/anything");
        assert_ne!(first, second, "call counter advances");
    }

    #[test]
    fn test_unknown_page_names_method() {
        let body = render_unknown("/no.Such/Method");
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains("Unknown method: /no.Such/Method"));
    }
}
