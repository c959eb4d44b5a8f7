//! The fixed XML schema a materialized report is written in (§6).
//!
//! `<request>` skips null fields entirely (`skip_none=true` in the
//! original's terms); `<comment>`/`<root>` render every field, including
//! nulls, as empty elements (`skip_none=false`) so a client can rely on a
//! stable element set.

use std::io::Cursor;

use comments_core::{CommentId, CommentRecord, Timestamp, UserId};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

pub struct ReportRequest {
    pub i_id: Option<i64>,
    pub itype_id: Option<i64>,
    pub author_id: Option<UserId>,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

/// Streams a full report document for one build. `rows` is processed in
/// fixed-size chunks so the caller's query can page through storage a few
/// rows at a time rather than holding the whole subtree at once.
pub fn render_report(
    request: &ReportRequest,
    root: Option<(CommentId, &CommentRecord)>,
    rows: &[(CommentId, CommentRecord)],
) -> Vec<u8> {
    let mut w = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    w.write_event(Event::Decl(BytesDecl::new("1.0", None, Some("yes"))))
        .expect("writing to an in-memory buffer cannot fail");

    w.write_event(Event::Start(BytesStart::new("user_request")))
        .unwrap();

    write_request(&mut w, request);

    w.write_event(Event::Start(BytesStart::new("report"))).unwrap();
    if let Some((id, record)) = root {
        write_comment_element(&mut w, "root", id, record);
    }
    for chunk in rows.chunks(3) {
        for (id, record) in chunk {
            write_comment_element(&mut w, "comment", *id, record);
        }
    }
    w.write_event(Event::End(BytesEnd::new("report"))).unwrap();

    w.write_event(Event::End(BytesEnd::new("user_request")))
        .unwrap();

    w.into_inner().into_inner()
}

fn write_request(w: &mut Writer<Cursor<Vec<u8>>>, request: &ReportRequest) {
    w.write_event(Event::Start(BytesStart::new("request"))).unwrap();
    write_skip_none_leaf(w, "i_id", request.i_id.map(|v| v.to_string()));
    write_skip_none_leaf(w, "itype_id", request.itype_id.map(|v| v.to_string()));
    write_skip_none_leaf(w, "author_id", request.author_id.map(|v| v.get().to_string()));
    write_skip_none_leaf(w, "start", request.start.map(|v| v.as_millis().to_string()));
    write_skip_none_leaf(w, "end", request.end.map(|v| v.as_millis().to_string()));
    w.write_event(Event::End(BytesEnd::new("request"))).unwrap();
}

/// Writes `<tag>…</tag>` when `value` is `Some`, omits the element entirely
/// otherwise — the `<request>` element's null-skipping behavior.
fn write_skip_none_leaf(w: &mut Writer<Cursor<Vec<u8>>>, tag: &str, value: Option<String>) {
    if let Some(text) = value {
        w.write_event(Event::Start(BytesStart::new(tag))).unwrap();
        w.write_event(Event::Text(BytesText::new(&text))).unwrap();
        w.write_event(Event::End(BytesEnd::new(tag))).unwrap();
    }
}

/// Writes `<tag/>` when `value` is `None`, `<tag>…</tag>` otherwise. Used by
/// `<comment>`/`<root>`, where every element in the fixed schema is always
/// present, nulls included.
fn write_opt_leaf(w: &mut Writer<Cursor<Vec<u8>>>, tag: &str, value: Option<String>) {
    match value {
        Some(text) => {
            w.write_event(Event::Start(BytesStart::new(tag))).unwrap();
            w.write_event(Event::Text(BytesText::new(&text))).unwrap();
            w.write_event(Event::End(BytesEnd::new(tag))).unwrap();
        }
        None => {
            w.write_event(Event::Empty(BytesStart::new(tag))).unwrap();
        }
    }
}

fn write_comment_element(
    w: &mut Writer<Cursor<Vec<u8>>>,
    tag: &str,
    id: CommentId,
    record: &CommentRecord,
) {
    w.write_event(Event::Start(BytesStart::new(tag))).unwrap();
    write_opt_leaf(w, "id", Some(id.get().to_string()));
    write_opt_leaf(w, "i_id", Some(record.i_id.to_string()));
    write_opt_leaf(w, "itype_id", Some(record.itype_id.to_string()));
    write_opt_leaf(w, "author_id", Some(record.author_id.get().to_string()));
    write_opt_leaf(w, "content", Some(record.content.clone()));
    write_opt_leaf(w, "created", Some(record.created.as_millis().to_string()));
    write_opt_leaf(w, "updated", Some(record.updated.as_millis().to_string()));
    write_opt_leaf(
        w,
        "parent_id",
        record.parent_id.map(|p| p.get().to_string()),
    );
    w.write_event(Event::End(BytesEnd::new(tag))).unwrap();
}

#[cfg(test)]
mod tests {
    use comments_core::InstanceId;

    use super::*;

    fn sample_comment(content: &str, parent_id: Option<CommentId>) -> CommentRecord {
        CommentRecord {
            itype_id: 1,
            i_id: 1,
            author_id: UserId::new(7),
            content: content.to_string(),
            created: Timestamp::from_millis(1000),
            updated: Timestamp::from_millis(1000),
            tree_id: InstanceId::new(1),
            parent_id,
            children_cnt: 0,
            scale: 0,
            lft: comments_core::Frac::ZERO,
            rht: comments_core::Frac::ONE,
            lft_ins: comments_core::Frac::ZERO,
        }
    }

    #[test]
    fn request_element_skips_null_fields() {
        let request = ReportRequest {
            i_id: Some(1),
            itype_id: Some(1),
            author_id: None,
            start: None,
            end: None,
        };
        let xml = render_report(&request, None, &[]);
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains("<i_id>1</i_id>"));
        assert!(!text.contains("<author_id"), "{text}");
        assert!(!text.contains("<start"), "{text}");
        assert!(!text.contains("<end"), "{text}");
    }

    #[test]
    fn comment_elements_render_nulls_as_empty_tags() {
        let request = ReportRequest {
            i_id: Some(1),
            itype_id: Some(1),
            author_id: None,
            start: None,
            end: None,
        };
        let comment = sample_comment("hello", None);
        let rows = vec![(CommentId::new(5), comment)];
        let xml = render_report(&request, None, &rows);
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains("<content>hello</content>"));
        assert!(text.contains("<parent_id/>"), "{text}");
    }

    #[test]
    fn root_element_is_only_present_when_given() {
        let request = ReportRequest {
            i_id: Some(5),
            itype_id: Some(0),
            author_id: None,
            start: None,
            end: None,
        };
        let root = sample_comment("root", None);
        let child = sample_comment("child", Some(CommentId::new(5)));
        let rows = vec![(CommentId::new(6), child)];

        let with_root = render_report(&request, Some((CommentId::new(5), &root)), &rows);
        let text = String::from_utf8(with_root).unwrap();
        assert!(text.contains("<root>"));

        let without_root = render_report(&request, None, &rows);
        let text = String::from_utf8(without_root).unwrap();
        assert!(!text.contains("<root>"));
    }
}
