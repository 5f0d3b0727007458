use lopdf::Document;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("failed to open PDF: {0}")]
    Open(String),
    #[error("the downloaded PDF has no pages")]
    EmptyDocument,
    #[error("failed to write PDF: {0}")]
    Write(String),
}

/// Number of pages in a PDF byte stream.
pub fn page_count(pdf: &[u8]) -> Result<usize, PdfError> {
    let doc = Document::load_mem(pdf).map_err(|e| PdfError::Open(e.to_string()))?;
    Ok(doc.get_pages().len())
}

/// Build a standalone PDF holding only the first page of `pdf`.
///
/// Every other page is removed from the page tree and objects that are no
/// longer reachable from the trailer are pruned, so fonts and images used
/// only by later pages do not survive. Resources page one inherits from its
/// parent `Pages` node are kept because the node itself is kept.
pub fn extract_first_page(pdf: &[u8]) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::load_mem(pdf).map_err(|e| PdfError::Open(e.to_string()))?;

    let pages = doc.get_pages();
    let Some(&first) = pages.keys().next() else {
        return Err(PdfError::EmptyDocument);
    };

    let rest: Vec<u32> = pages.keys().copied().filter(|&n| n != first).collect();
    if !rest.is_empty() {
        doc.delete_pages(&rest);
    }
    doc.prune_objects();
    doc.renumber_objects();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| PdfError::Write(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// Build a PDF with one page per label; each page draws its label with a
    /// font shared through the page tree, and page `i` also gets a private
    /// font named `Private<i>`.
    fn build_pdf(labels: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            let private_font = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => format!("Private{i}"),
            });
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*label)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "P1" => private_font },
                },
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn three_pages_become_one() {
        let src = build_pdf(&["Page one", "Page two", "Page three"]);
        assert_eq!(page_count(&src).unwrap(), 3);

        let out = extract_first_page(&src).unwrap();
        assert_eq!(page_count(&out).unwrap(), 1);

        let doc = Document::load_mem(&out).unwrap();
        let (_, &page_id) = doc.get_pages().iter().next().unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        assert!(contains(&content, b"Page one"));
    }

    #[test]
    fn later_pages_and_their_resources_are_dropped() {
        let src = build_pdf(&["Page one", "Page two", "Page three"]);
        let out = extract_first_page(&src).unwrap();

        assert!(!contains(&out, b"Page two"));
        assert!(!contains(&out, b"Page three"));
        assert!(!contains(&out, b"Private1"));
        assert!(!contains(&out, b"Private2"));
        // Resources referenced by page one itself are kept
        assert!(contains(&out, b"Private0"));
        assert!(contains(&out, b"Courier"));
    }

    #[test]
    fn single_page_input_is_kept() {
        let src = build_pdf(&["Only page"]);
        let out = extract_first_page(&src).unwrap();
        assert_eq!(page_count(&out).unwrap(), 1);
        assert!(contains(&out, b"Only page"));
    }

    #[test]
    fn empty_document_is_rejected() {
        let src = build_pdf(&[]);
        assert!(matches!(
            extract_first_page(&src),
            Err(PdfError::EmptyDocument)
        ));
    }

    #[test]
    fn garbage_is_an_open_error() {
        let err = extract_first_page(b"<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, PdfError::Open(_)));
    }
}
