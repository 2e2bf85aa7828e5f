use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ComplianceError, Result};

#[derive(PartialEq)]
enum State {
    Default,
    InDocRef,
    InDocRefId,
    InQrRef,
    Replacing { depth: usize },
}

fn is_extension_content(e: &BytesStart) -> bool {
    e.local_name().as_ref() == b"ExtensionContent"
}

fn write_error(e: impl std::fmt::Display) -> ComplianceError {
    ComplianceError::Parse(format!("failed to write XML: {e}"))
}

/// Puts the signature block into the first `ext:ExtensionContent` and the QR
/// payload into the `QR` document reference, leaving every other byte alone.
pub fn embed_signature_and_qr(xml: &str, signature_block: &str, qr: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    {
        let cfg = reader.config_mut();
        cfg.trim_text_start = false;
        cfg.trim_text_end = false;
    }

    let mut writer = Writer::new(Vec::new());
    let mut state = State::Default;
    let mut signature_done = false;
    let mut qr_done = false;
    let mut doc_ref_depth = 0usize;

    loop {
        let event = reader.read_event()?;

        // swallow whatever the slot held until its end tag
        if let State::Replacing { depth } = &mut state {
            match event {
                Event::Start(_) => *depth += 1,
                Event::End(e) if *depth == 0 => {
                    writer.write_event(Event::End(e)).map_err(write_error)?;
                    state = if doc_ref_depth > 0 {
                        State::InQrRef
                    } else {
                        State::Default
                    };
                }
                Event::End(_) => *depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Eof => break,

            Event::Start(e) if !signature_done && is_extension_content(&e) => {
                writer.write_event(Event::Start(e)).map_err(write_error)?;
                writer.get_mut().extend_from_slice(signature_block.as_bytes());
                signature_done = true;
                state = State::Replacing { depth: 0 };
            }
            Event::Empty(e) if !signature_done && is_extension_content(&e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e)).map_err(write_error)?;
                writer.get_mut().extend_from_slice(signature_block.as_bytes());
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(write_error)?;
                signature_done = true;
            }

            Event::Start(e) if state == State::Default => {
                if e.local_name().as_ref() == b"AdditionalDocumentReference" {
                    state = State::InDocRef;
                    doc_ref_depth = 1;
                }
                writer.write_event(Event::Start(e)).map_err(write_error)?;
            }
            Event::Start(e) => {
                doc_ref_depth += 1;
                let is_id = e.local_name().as_ref() == b"ID";
                let is_slot = e.local_name().as_ref() == b"EmbeddedDocumentBinaryObject";
                writer.write_event(Event::Start(e)).map_err(write_error)?;
                if state == State::InDocRef && is_id {
                    state = State::InDocRefId;
                } else if state == State::InQrRef && !qr_done && is_slot {
                    writer
                        .write_event(Event::Text(BytesText::new(qr)))
                        .map_err(write_error)?;
                    qr_done = true;
                    // the slot's end tag is written when leaving Replacing
                    doc_ref_depth -= 1;
                    state = State::Replacing { depth: 0 };
                }
            }

            Event::Empty(e)
                if state == State::InQrRef
                    && !qr_done
                    && e.local_name().as_ref() == b"EmbeddedDocumentBinaryObject" =>
            {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e)).map_err(write_error)?;
                writer
                    .write_event(Event::Text(BytesText::new(qr)))
                    .map_err(write_error)?;
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(write_error)?;
                qr_done = true;
            }

            Event::Text(e) if state == State::InDocRefId => {
                if e.unescape()?.trim() == "QR" {
                    state = State::InQrRef;
                }
                writer.write_event(Event::Text(e)).map_err(write_error)?;
            }

            Event::End(e) if state != State::Default => {
                doc_ref_depth = doc_ref_depth.saturating_sub(1);
                if state == State::InDocRefId {
                    state = State::InDocRef;
                }
                if doc_ref_depth == 0 {
                    state = State::Default;
                }
                writer.write_event(Event::End(e)).map_err(write_error)?;
            }

            ev => writer.write_event(ev).map_err(write_error)?,
        }
    }

    if !signature_done {
        return Err(ComplianceError::format(
            "UBLExtensions",
            "document has no ext:ExtensionContent slot for the signature",
        ));
    }
    if !qr_done {
        return Err(ComplianceError::format(
            "QR",
            "document has no QR document reference to hold the QR code",
        ));
    }
    String::from_utf8(writer.into_inner()).map_err(write_error)
}
