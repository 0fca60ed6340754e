//! JavaScript snippets for element interaction.
//!
//! Every snippet is a self-invoking function returning a small JSON object.
//! User-provided values (selectors, names, form values) are only ever placed
//! inside string literals, after [`sanitize_js_string`].

use super::Target;

/// Shared helpers prepended to every snippet.
const PRELUDE: &str = r#"
    const visible = (e) => !!e
        && !!(e.offsetWidth || e.offsetHeight || e.getClientRects().length)
        && getComputedStyle(e).visibility !== 'hidden';
    const accName = (e) => (e.getAttribute('aria-label') || e.innerText || e.value || '')
        .replace(/\s+/g, ' ').trim();
"#;

/// CSS selectors that carry a role implicitly.
fn role_selector(role: &str) -> String {
    let explicit = format!(r#"[role="{role}"]"#);
    match role {
        "button" => format!(
            r#"button, input[type="button"], input[type="submit"], {explicit}"#
        ),
        "link" => format!("a[href], {explicit}"),
        "textbox" => format!(r#"input:not([type]), input[type="text"], textarea, {explicit}"#),
        _ => explicit,
    }
}

/// A JS expression evaluating to the first matching element, or `null`.
pub fn locate(target: &Target) -> String {
    match target {
        Target::Css { selector } => {
            format!("document.querySelector('{}')", sanitize_js_string(selector))
        }
        Target::XPath { expr } => format!(
            "document.evaluate('{}', document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            sanitize_js_string(expr)
        ),
        Target::Placeholder { text } => format!(
            "[...document.querySelectorAll('[placeholder]')].find(e => e.getAttribute('placeholder') === '{}') || null",
            sanitize_js_string(text)
        ),
        Target::Role { role, name, exact } => {
            let matcher = if *exact {
                "accName(e) === want"
            } else {
                "accName(e).toLowerCase().includes(want.toLowerCase())"
            };
            format!(
                "(() => {{ const want = '{}'; return [...document.querySelectorAll('{}')].find(e => visible(e) && {matcher}) || null; }})()",
                sanitize_js_string(name),
                sanitize_js_string(&role_selector(role)),
            )
        }
    }
}

/// Snippet returning `{ found, visible }`.
pub fn visibility_script(target: &Target) -> String {
    format!(
        r#"(() => {{
            {PRELUDE}
            const el = {};
            return {{ found: !!el, visible: visible(el) }};
        }})()"#,
        locate(target)
    )
}

/// Snippet that clicks the target, dispatching the full mouse sequence.
pub fn click_script(target: &Target) -> String {
    format!(
        r#"(() => {{
            {PRELUDE}
            const el = {};
            if (!el) {{ return {{ success: false, reason: "not found" }}; }}
            el.scrollIntoView({{ block: "center" }});
            for (const type of ["pointerdown", "mousedown", "pointerup", "mouseup"]) {{
                el.dispatchEvent(new MouseEvent(type, {{ bubbles: true, cancelable: true, view: window }}));
            }}
            el.click();
            return {{ success: true }};
        }})()"#,
        locate(target)
    )
}

/// Snippet that sets an input's value through the native setter.
pub fn fill_script(target: &Target, value: &str) -> String {
    format!(
        r#"(() => {{
            {PRELUDE}
            const el = {};
            if (!el) {{ return {{ success: false, reason: "not found" }}; }}
            const proto = el instanceof HTMLTextAreaElement
                ? HTMLTextAreaElement.prototype
                : HTMLInputElement.prototype;
            const setter = Object.getOwnPropertyDescriptor(proto, "value").set;
            el.focus();
            setter.call(el, '{}');
            el.dispatchEvent(new Event("input", {{ bubbles: true }}));
            el.dispatchEvent(new Event("change", {{ bubbles: true }}));
            return {{ success: true }};
        }})()"#,
        locate(target),
        sanitize_js_string(value)
    )
}

/// Read the `success` flag from a snippet result.
pub fn succeeded(result: &serde_json::Value) -> bool {
    result
        .as_object()
        .and_then(|o| o.get("success"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Sanitize a string for safe injection into a JavaScript string literal.
///
/// Escapes all characters that could break out of a JS string context:
/// - Backslashes, single/double quotes, backticks
/// - Newlines, carriage returns, tabs
/// - HTML script tags
/// - Null bytes
pub fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}
