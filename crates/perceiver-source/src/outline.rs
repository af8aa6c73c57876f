//! Condensing raw page markup into a YAML outline.
//!
//! Raw UI trees are enormous and mostly noise. The outline keeps the tag
//! structure and a per-platform whitelist of attributes that matter for
//! deciding the next action, and renders the result as YAML, which reads
//! well in a prompt and compresses the markup considerably.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_yaml::{Mapping, Value as Yaml};
use uiscout_core_types::Platform;

use crate::error::CaptureError;

const ANDROID_ATTRS: &[&str] = &[
    "resource-id",
    "text",
    "content-desc",
    "class",
    "bounds",
    "clickable",
    "checkable",
    "checked",
    "enabled",
    "focused",
    "selected",
    "scrollable",
    "password",
    "displayed",
    "hint",
];

const IOS_ATTRS: &[&str] = &[
    "name", "label", "value", "type", "enabled", "visible", "accessible", "x", "y", "width",
    "height", "index",
];

const WEB_ATTRS: &[&str] = &[
    "id",
    "name",
    "class",
    "href",
    "src",
    "alt",
    "title",
    "value",
    "placeholder",
    "type",
    "role",
    "aria-label",
    "data-testid",
    "onclick",
];

/// Tags whose content never helps the decision service.
const HTML_SKIP: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// HTML elements that never have children.
const HTML_VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Default)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

/// Outline markup for the given platform.
pub fn markup_outline(platform: Platform, markup: &str) -> Result<String, CaptureError> {
    match platform {
        Platform::Web => html_outline(markup),
        Platform::Android => xml_outline(markup, ANDROID_ATTRS),
        Platform::Ios => xml_outline(markup, IOS_ATTRS),
    }
}

/// Outline a native UI tree. The markup is driver-produced XML, so parse
/// errors are real failures and surface as [`CaptureError::Markup`].
pub fn xml_outline(markup: &str, whitelist: &[&str]) -> Result<String, CaptureError> {
    let mut reader = Reader::from_str(markup);
    reader.trim_text(true);

    let mut roots: Vec<Node> = Vec::new();
    let mut stack: Vec<Node> = Vec::new();

    loop {
        match reader
            .read_event()
            .map_err(|err| CaptureError::Markup(err.to_string()))?
        {
            Event::Start(start) => stack.push(node_from(&start, whitelist)),
            Event::Empty(start) => {
                attach(node_from(&start, whitelist), &mut stack, &mut roots)
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(node, &mut stack, &mut roots);
                }
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    append_text(parent, &text.unescape().unwrap_or_default());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    // Unclosed elements at EOF still belong in the outline.
    while let Some(node) = stack.pop() {
        attach(node, &mut stack, &mut roots);
    }
    render(roots)
}

/// Outline an HTML document leniently: mismatched or missing end tags and
/// late parse errors truncate rather than fail, and script/style subtrees
/// are dropped entirely.
pub fn html_outline(markup: &str) -> Result<String, CaptureError> {
    let mut reader = Reader::from_str(markup);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut roots: Vec<Node> = Vec::new();
    let mut stack: Vec<Node> = Vec::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            // Real pages routinely carry markup quick-xml rejects; keep
            // whatever structure was read up to that point.
            Err(_) => break,
        };
        match event {
            Event::Start(start) => {
                let tag = tag_name(&start);
                if HTML_SKIP.contains(&tag.as_str()) {
                    skip_subtree(&mut reader, &tag);
                    continue;
                }
                let node = node_from(&start, WEB_ATTRS);
                if HTML_VOID.contains(&tag.as_str()) {
                    attach(node, &mut stack, &mut roots);
                } else {
                    stack.push(node);
                }
            }
            Event::Empty(start) => {
                if HTML_SKIP.contains(&tag_name(&start).as_str()) {
                    continue;
                }
                attach(node_from(&start, WEB_ATTRS), &mut stack, &mut roots);
            }
            Event::End(end) => {
                let tag = String::from_utf8_lossy(end.local_name().as_ref()).to_lowercase();
                if !stack.iter().any(|n| n.tag == tag) {
                    continue;
                }
                while let Some(node) = stack.pop() {
                    let done = node.tag == tag;
                    attach(node, &mut stack, &mut roots);
                    if done {
                        break;
                    }
                }
            }
            Event::Text(text) => {
                if let Some(parent) = stack.last_mut() {
                    append_text(parent, &text.unescape().unwrap_or_default());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    while let Some(node) = stack.pop() {
        attach(node, &mut stack, &mut roots);
    }
    render(roots)
}

/// Consume events until the end tag of a skipped element. Script bodies can
/// contain stray `<` markup, so interior events are ignored wholesale.
fn skip_subtree(reader: &mut Reader<&[u8]>, tag: &str) {
    loop {
        match reader.read_event() {
            Ok(Event::End(end))
                if String::from_utf8_lossy(end.local_name().as_ref()).eq_ignore_ascii_case(tag) =>
            {
                return
            }
            Ok(Event::Eof) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

fn tag_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).to_lowercase()
}

fn node_from(start: &BytesStart<'_>, whitelist: &[&str]) -> Node {
    let mut attrs = Vec::new();
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        if !whitelist.contains(&key.as_str()) {
            continue;
        }
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        if !value.is_empty() {
            attrs.push((key, value));
        }
    }
    Node {
        tag: tag_name(start),
        attrs,
        ..Node::default()
    }
}

fn append_text(node: &mut Node, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !node.text.is_empty() {
        node.text.push(' ');
    }
    node.text.push_str(text);
}

fn attach(node: Node, stack: &mut Vec<Node>, roots: &mut Vec<Node>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

fn render(roots: Vec<Node>) -> Result<String, CaptureError> {
    let value = match roots.len() {
        0 => Yaml::Null,
        1 => to_yaml(&roots[0]),
        _ => Yaml::Sequence(roots.iter().map(to_yaml).collect()),
    };
    Ok(serde_yaml::to_string(&value)?)
}

fn to_yaml(node: &Node) -> Yaml {
    let mut map = Mapping::new();
    map.insert(Yaml::from("tag"), Yaml::from(node.tag.clone()));
    for (key, value) in &node.attrs {
        map.insert(Yaml::from(key.clone()), scalar(value));
    }
    if !node.text.is_empty() {
        map.insert(Yaml::from("text"), Yaml::from(node.text.clone()));
    }
    if !node.children.is_empty() {
        map.insert(
            Yaml::from("children"),
            Yaml::Sequence(node.children.iter().map(to_yaml).collect()),
        );
    }
    Yaml::Mapping(map)
}

/// Coerce attribute strings so booleans and counts read naturally in YAML.
fn scalar(value: &str) -> Yaml {
    match value {
        "true" => return Yaml::from(true),
        "false" => return Yaml::from(false),
        _ => {}
    }
    if let Ok(number) = value.parse::<i64>() {
        return Yaml::from(number);
    }
    Yaml::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn android_tree_keeps_whitelisted_attrs() {
        let markup = r#"<hierarchy rotation="0">
            <node class="android.widget.Button" text="Login" bounds="[0,0][100,50]"
                  clickable="true" index="3" package="com.example"/>
        </hierarchy>"#;
        let outline = markup_outline(Platform::Android, markup).unwrap();
        assert!(outline.contains("tag: hierarchy"));
        assert!(outline.contains("text: Login"));
        assert!(outline.contains("bounds: '[0,0][100,50]'"));
        assert!(outline.contains("clickable: true"));
        // rotation and index are not on the Android whitelist.
        assert!(!outline.contains("rotation"));
        assert!(!outline.contains("index"));
    }

    #[test]
    fn ios_tree_coerces_geometry() {
        let markup = r#"<XCUIElementTypeApplication name="Settings">
            <XCUIElementTypeButton name="General" x="20" y="140" width="335" height="44"
                enabled="true" visible="true"/>
        </XCUIElementTypeApplication>"#;
        let outline = markup_outline(Platform::Ios, markup).unwrap();
        assert!(outline.contains("tag: xcuielementtypebutton"));
        assert!(outline.contains("x: 20"));
        assert!(outline.contains("enabled: true"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(xml_outline("<hierarchy><node></hierarchy>", ANDROID_ATTRS).is_err());
    }

    #[test]
    fn html_drops_script_and_survives_void_tags() {
        let markup = r#"<html><head><script>let x = "<div>";</script></head>
            <body>
              <img src="logo.png" alt="logo">
              <p class="intro">Hello<br>world</p>
            </body></html>"#;
        let outline = html_outline(markup).unwrap();
        assert!(outline.contains("tag: img"));
        assert!(outline.contains("src: logo.png"));
        assert!(outline.contains("Hello"));
        assert!(!outline.contains("let x"));
    }

    #[test]
    fn html_with_mismatched_end_tags_still_outlines() {
        let markup = "<div><p>one</div><span>two</span>";
        let outline = html_outline(markup).unwrap();
        assert!(outline.contains("tag: div"));
        assert!(outline.contains("two"));
    }

    #[test]
    fn empty_markup_renders_null() {
        let outline = html_outline("").unwrap();
        assert_eq!(outline.trim(), "null");
    }
}
