use pulldown_cmark::{html, Options, Parser};

/// Renders a post source's raw markdown to display-ready HTML. Rendering
/// happens once at ingestion time; the result is stored in the `body`
/// column, not regenerated per read.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(markdown, options));
    body
}
