//! Turtle serialisation of fragments for the durable graph files.
//!
//! Each fragment becomes one subject block: `a <class>` first, then the
//! attributes in their stored order. URIs covered by the namespace table are
//! written as prefixed names. The dirty flag is never written.

use metarelate_core::{term, Fragment, Namespaces};

/// One subject block, terminated by a blank line.
pub fn fragment_block(ns: &Namespaces, fragment: &Fragment) -> String {
    let mut out = format!("{}\n    a {}", fragment.id.to_n3(), fragment.kind.class());
    for (predicate, objects) in fragment.attributes.iter() {
        let rendered: Vec<String> = objects.as_slice().iter().map(|o| compact_object(ns, o)).collect();
        out.push_str(&format!(" ;\n    {} {}", predicate, rendered.join(",\n        ")));
    }
    out.push_str(" .\n\n");
    out
}

/// A full turtle document: prolog followed by every fragment.
pub fn document(ns: &Namespaces, fragments: &[Fragment]) -> String {
    let mut out = ns.turtle_prolog();
    for fragment in fragments {
        out.push_str(&fragment_block(ns, fragment));
    }
    out
}

/// Drops every `@prefix` line, for appending to a file that has its header.
pub fn strip_prefixes(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("@prefix"))
        .fold(String::with_capacity(text.len()), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        })
        .trim_start_matches('\n')
        .to_string()
}

fn compact_object(ns: &Namespaces, object: &str) -> String {
    term::as_uri(object)
        .and_then(|uri| ns.compact(uri))
        .unwrap_or_else(|| object.to_string())
}
