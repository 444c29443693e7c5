//! Scripts injected into the page
//!
//! The extraction script only reports raw facts about candidates. Filtering,
//! labelling and scoring happen in Rust so they can be tested without a
//! browser.

/// Attribute written onto every candidate during extraction
pub const MARKER_ATTRIBUTE: &str = "data-agent-marker";

/// CSS selector that finds the candidate carrying `marker`
pub fn marker_selector(marker: usize) -> String {
    format!("[{}=\"{}\"]", MARKER_ATTRIBUTE, marker)
}

/// Collects candidates from the top document and every same-origin iframe.
///
/// Returns `{viewport: {width, height}, candidates: [...]}`. Rects are
/// already shifted by the owning iframe's offset. Markers from the previous
/// cycle are removed before new ones are written.
pub const EXTRACT_ELEMENTS: &str = r#"
const MARKER = 'data-agent-marker';
const SELECTORS = 'a, button, input, textarea, select, [role="button"], [role="link"], ' +
    '[onclick], [tabindex]:not([tabindex="-1"]), [contenteditable="true"], ' +
    '[data-testid], [data-cy], .btn, .button, .link, .clickable, ' +
    'form, label, option, summary, details, [href], [src]';
const candidates = [];
let next = 1;

function collect(doc, offset, inFrame) {
    doc.querySelectorAll('[' + MARKER + ']').forEach(el => el.removeAttribute(MARKER));
    for (const el of doc.querySelectorAll(SELECTORS)) {
        try {
            const rect = el.getBoundingClientRect();
            const style = doc.defaultView.getComputedStyle(el);
            const attr = name => el.getAttribute(name) || '';
            const marker = next++;
            el.setAttribute(MARKER, String(marker));
            candidates.push({
                marker: marker,
                tag: el.tagName.toLowerCase(),
                kind: typeof el.type === 'string' && el.type ? el.type : 'unknown',
                text: el.textContent ? el.textContent.trim().substring(0, 300) : '',
                ariaLabel: attr('aria-label'),
                placeholder: attr('placeholder'),
                title: attr('title'),
                alt: attr('alt'),
                value: typeof el.value === 'string' ? el.value : attr('value'),
                role: attr('role'),
                hasClickHandler: !!(el.onclick || el.getAttribute('onclick')),
                hidden: style.visibility === 'hidden' || style.display === 'none',
                inFrame: inFrame,
                rect: {
                    x: rect.x + offset.x,
                    y: rect.y + offset.y,
                    width: rect.width,
                    height: rect.height
                },
                attributes: {
                    id: el.id || '',
                    class: typeof el.className === 'string' ? el.className : '',
                    name: attr('name'),
                    type: attr('type'),
                    role: attr('role')
                }
            });
        } catch (e) {
            // best effort per candidate
        }
    }
}

collect(document, {x: 0, y: 0}, false);
for (const iframe of document.querySelectorAll('iframe')) {
    try {
        const doc = iframe.contentDocument || (iframe.contentWindow && iframe.contentWindow.document);
        if (!doc) continue;
        const r = iframe.getBoundingClientRect();
        collect(doc, {x: r.x, y: r.y}, true);
    } catch (e) {
        // cross-origin frame
    }
}

return {
    viewport: {width: window.innerWidth, height: window.innerHeight},
    candidates: candidates
};
"#;

/// Locates the frame that owns the element carrying marker `arguments[0]`.
///
/// Returns `{found: false}`, `{found: true, frameIndex: null}` for the top
/// document, or `{found: true, frameIndex: i}` where `i` indexes
/// `document.querySelectorAll('iframe')`.
pub const LOCATE_FRAME: &str = r#"
const selector = '[data-agent-marker="' + arguments[0] + '"]';
if (document.querySelector(selector)) {
    return {found: true, frameIndex: null};
}
const iframes = Array.from(document.querySelectorAll('iframe'));
for (let i = 0; i < iframes.length; i++) {
    try {
        const doc = iframes[i].contentDocument;
        if (doc && doc.querySelector(selector)) {
            return {found: true, frameIndex: i};
        }
    } catch (e) {
        // cross-origin frame
    }
}
return {found: false, frameIndex: null};
"#;

pub const READY_STATE: &str = "return document.readyState;";

pub const SCROLL_INTO_VIEW: &str = "arguments[0].scrollIntoView({block: 'center'});";

pub const SCRIPT_CLICK: &str = "arguments[0].click();";

pub const DISPATCH_CLICK: &str =
    "arguments[0].dispatchEvent(new MouseEvent('click', {bubbles: true, cancelable: true, view: window}));";

/// Scrolls the window by `arguments[0]` pixels vertically
pub const SCROLL_BY: &str = "window.scrollBy(0, arguments[0]);";

pub const TEXT_CONTENT: &str =
    "return arguments[0].textContent || arguments[0].value || '';";
