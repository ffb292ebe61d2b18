use crate::error::IngestError;
use crate::models::{Location, SourceType};
use crate::ocr::OcrEngine;
use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_DOCX_XML_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Text produced by a reader before it is bound to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub location: Location,
    pub text: String,
}

impl ExtractedText {
    fn new(location: Location, text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self {
                location,
                text: trimmed.to_string(),
            })
        }
    }
}

/// Produces located text in document order. Never returns whitespace-only units.
pub trait DocumentReader: Send + Sync {
    fn read(&self, name: &str, bytes: &[u8]) -> Result<Vec<ExtractedText>, IngestError>;
}

#[derive(Default, Clone)]
pub struct PdfReader {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl PdfReader {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self { ocr }
    }
}

impl DocumentReader for PdfReader {
    fn read(&self, name: &str, bytes: &[u8]) -> Result<Vec<ExtractedText>, IngestError> {
        let mut document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        // Owner-password-only files open with the empty user password.
        if document.is_encrypted() {
            if let Err(error) = document.decrypt("") {
                debug!(file = %name, %error, "empty user password rejected");
                return Err(IngestError::Encrypted);
            }
            debug!(file = %name, "decrypted with empty user password");
        }

        let mut pages = Vec::new();
        let mut blank_pages = Vec::new();

        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    debug!(file = %name, page = page_no, %error, "page text layer unreadable");
                    String::new()
                }
            };

            if text.trim().is_empty() {
                blank_pages.push(page_no);
            }
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        if !blank_pages.is_empty() {
            if let Some(ocr) = &self.ocr {
                debug!(file = %name, pages = ?blank_pages, "running OCR fallback");
                match ocr.recognize(name, bytes, &blank_pages) {
                    Ok(recognized) => {
                        for found in recognized {
                            if let Some(page) = pages.iter_mut().find(|page| page.number == found.number) {
                                page.text = found.text;
                            }
                        }
                    }
                    Err(error) => {
                        warn!(file = %name, %error, "OCR fallback failed; image-only pages stay empty");
                    }
                }
            }
        }

        Ok(pages
            .into_iter()
            .filter_map(|page| ExtractedText::new(Location::Page(page.number), &page.text))
            .collect())
    }
}

#[derive(Default, Clone, Copy)]
pub struct DocxReader;

impl DocumentReader for DocxReader {
    fn read(&self, _name: &str, bytes: &[u8]) -> Result<Vec<ExtractedText>, IngestError> {
        let xml = read_document_xml(bytes)?;
        let paragraphs = docx_paragraphs(&xml)?;

        Ok(paragraphs
            .iter()
            .enumerate()
            .filter_map(|(index, text)| {
                ExtractedText::new(Location::Paragraph(index as u32 + 1), text)
            })
            .collect())
    }
}

fn read_document_xml(bytes: &[u8]) -> Result<Vec<u8>, IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| IngestError::Docx(error.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| IngestError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry.take(MAX_DOCX_XML_BYTES).read_to_end(&mut xml)?;
    if xml.len() as u64 >= MAX_DOCX_XML_BYTES {
        return Err(IngestError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    Ok(xml)
}

/// Text of every `w:p` in document order, including empty paragraphs so that
/// paragraph indices match the document. A paragraph nested in a text box is
/// numbered after the paragraph that contains it; `mc:Fallback` copies of
/// alternate content are skipped.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, IngestError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_text = false;
    let mut fallback_depth = 0usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|error| IngestError::Docx(error.to_string()))?;

        match event {
            Event::Eof => break,
            Event::Start(element) if fallback_depth > 0 => {
                if element.local_name().as_ref() == b"Fallback" {
                    fallback_depth += 1;
                }
            }
            Event::End(element) if fallback_depth > 0 => {
                if element.local_name().as_ref() == b"Fallback" {
                    fallback_depth -= 1;
                }
            }
            _ if fallback_depth > 0 => {}
            Event::Start(element) => match element.local_name().as_ref() {
                b"p" => {
                    open.push(paragraphs.len());
                    paragraphs.push(String::new());
                }
                b"t" => in_text = true,
                b"Fallback" => fallback_depth = 1,
                _ => {}
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" | b"br" => {
                    if let Some(&index) = open.last() {
                        paragraphs[index].push(' ');
                    }
                }
                _ => {}
            },
            Event::Text(text) if in_text => {
                let decoded = text
                    .unescape()
                    .map_err(|error| IngestError::Docx(error.to_string()))?;
                if let Some(&index) = open.last() {
                    paragraphs[index].push_str(&decoded);
                }
            }
            Event::End(element) => match element.local_name().as_ref() {
                b"p" => {
                    open.pop();
                }
                b"t" => in_text = false,
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

#[derive(Default, Clone, Copy)]
pub struct PlainTextReader;

impl DocumentReader for PlainTextReader {
    fn read(&self, _name: &str, bytes: &[u8]) -> Result<Vec<ExtractedText>, IngestError> {
        let text = String::from_utf8_lossy(bytes);

        Ok(text
            .lines()
            .enumerate()
            .filter_map(|(index, line)| ExtractedText::new(Location::Line(index as u32 + 1), line))
            .collect())
    }
}

/// Picks the reader for a source type.
#[derive(Clone)]
pub struct DocumentReaders {
    pdf: Arc<dyn DocumentReader>,
    docx: Arc<dyn DocumentReader>,
    txt: Arc<dyn DocumentReader>,
}

impl Default for DocumentReaders {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DocumentReaders {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self {
            pdf: Arc::new(PdfReader::new(ocr)),
            docx: Arc::new(DocxReader),
            txt: Arc::new(PlainTextReader),
        }
    }

    pub fn with_reader(mut self, source_type: SourceType, reader: Arc<dyn DocumentReader>) -> Self {
        match source_type {
            SourceType::Pdf => self.pdf = reader,
            SourceType::Docx => self.docx = reader,
            SourceType::Txt => self.txt = reader,
        }
        self
    }

    pub fn reader(&self, source_type: SourceType) -> &dyn DocumentReader {
        match source_type {
            SourceType::Pdf => self.pdf.as_ref(),
            SourceType::Docx => self.docx.as_ref(),
            SourceType::Txt => self.txt.as_ref(),
        }
    }

    pub fn read(
        &self,
        source_type: SourceType,
        name: &str,
        bytes: &[u8],
    ) -> Result<Vec<ExtractedText>, IngestError> {
        self.reader(source_type).read(name, bytes)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, encryption, Document, Object, Stream};
    use std::io::Write;

    /// A PDF with one page per entry; `None` produces a page with no text layer.
    pub fn pdf_with_pages(pages: &[Option<&str>]) -> Vec<u8> {
        save(build_pdf(pages))
    }

    /// RC4 40-bit (R2) encrypted PDF. With `opens_without_password` the user
    /// password is empty, as in files that only carry an owner password.
    pub fn encrypted_pdf_with_pages(pages: &[Option<&str>], opens_without_password: bool) -> Vec<u8> {
        let mut doc = build_pdf(pages);
        let file_id = b"docsift-fixture-id".to_vec();
        doc.trailer.set(
            "ID",
            vec![
                Object::string_literal(file_id.clone()),
                Object::string_literal(file_id),
            ],
        );
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "Length" => 40,
            "O" => Object::string_literal(vec![0x5a_u8; 32]),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);

        let key = encryption::get_encryption_key(&doc, "", false).expect("key derives");
        for (&id, object) in doc.objects.iter_mut() {
            if id == encrypt_id {
                continue;
            }
            // RC4 is symmetric, so decrypting plaintext encrypts it.
            let Ok(cipher) = encryption::decrypt_object(&key, id, object) else {
                continue;
            };
            match object {
                Object::Stream(stream) => stream.set_content(cipher),
                Object::String(content, _) => *content = cipher,
                _ => {}
            }
        }

        let user_check = if opens_without_password {
            rc4(&key, &PASSWORD_PAD)
        } else {
            vec![0x11; 32]
        };
        if let Ok(Object::Dictionary(encrypt)) = doc.get_object_mut(encrypt_id) {
            encrypt.set("U", Object::string_literal(user_check));
        }
        save(doc)
    }

    const PASSWORD_PAD: [u8; 32] = [
        0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
        0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
        0x69, 0x7A,
    ];

    fn rc4(key: &[u8], input: &[u8]) -> Vec<u8> {
        let mut state: Vec<u8> = (0..=255).collect();
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, j as usize);
        }

        let (mut i, mut j) = (0u8, 0u8);
        input
            .iter()
            .map(|byte| {
                i = i.wrapping_add(1);
                j = j.wrapping_add(state[i as usize]);
                state.swap(i as usize, j as usize);
                let k = state[state[i as usize].wrapping_add(state[j as usize]) as usize];
                byte ^ k
            })
            .collect()
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("pdf saves");
        out
    }

    fn build_pdf(pages: &[Option<&str>]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for page in pages {
            let mut operations = Vec::new();
            if let Some(text) = page {
                operations = vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ];
            }
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("content encodes"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    pub fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|text| {
                if text.is_empty() {
                    "<w:p/>".to_string()
                } else {
                    format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
                }
            })
            .collect();
        docx_with_body(&body)
    }

    /// Wraps raw `w:body` markup in a minimal DOCX package.
    pub fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document \
             xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\" \
             xmlns:mc=\"http://schemas.openxmlformats.org/markup-compatibility/2006\">\
             <w:body>{body}</w:body></w:document>"
        );

        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .expect("zip entry starts");
            zip.write_all(xml.as_bytes()).expect("zip entry writes");
            zip.finish().expect("zip finishes");
        }
        buf
    }
}
