use quick_xml::events::Event;
use quick_xml::Reader;

use super::error::Result;

/// One `<propstat>` block of a multistatus response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropStat {
    pub status: String,
    pub display_name: String,
    pub is_collection: bool,
    pub content_length: String,
    pub content_type: String,
    pub last_modified: String,
    pub etag: String,
}

/// One `<response>` record: the resource href and its propstat blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiStatusResponse {
    pub href: String,
    pub propstats: Vec<PropStat>,
}

impl MultiStatusResponse {
    /// First propstat whose status line contains `status` (e.g. `"200"`)
    pub fn props(&self, status: &str) -> Option<&PropStat> {
        self.propstats.iter().find(|p| p.status.contains(status))
    }
}

/// Streams a `207 Multi-Status` body, handing each completed `<response>`
/// to `on_response` in document order. Elements are matched by local name,
/// so any namespace prefix works. Stops at the first error, whether it
/// comes from the document or from the callback.
pub fn parse_multistatus<F>(body: &[u8], mut on_response: F) -> Result<()>
where
    F: FnMut(MultiStatusResponse) -> Result<()>,
{
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut state = ParseState::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                state.open(&name);
                state.stack.push(name);
            }
            Event::Empty(e) => {
                let name = e.local_name().as_ref().to_vec();
                state.open(&name);
                state.close(&name, &mut on_response)?;
            }
            Event::End(e) => {
                state.stack.pop();
                let name = e.local_name().as_ref().to_vec();
                state.close(&name, &mut on_response)?;
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(quick_xml::Error::from)?;
                state.text(&text);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c);
                state.text(&text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

#[derive(Default)]
struct ParseState {
    stack: Vec<Vec<u8>>,
    response: Option<MultiStatusResponse>,
    propstat: Option<PropStat>,
}

impl ParseState {
    fn open(&mut self, name: &[u8]) {
        match name {
            b"response" => self.response = Some(MultiStatusResponse::default()),
            b"propstat" if self.response.is_some() => self.propstat = Some(PropStat::default()),
            b"collection" if self.parent_is(b"resourcetype") => {
                if let Some(propstat) = self.propstat.as_mut() {
                    propstat.is_collection = true;
                }
            }
            _ => {}
        }
    }

    fn close<F>(&mut self, name: &[u8], on_response: &mut F) -> Result<()>
    where
        F: FnMut(MultiStatusResponse) -> Result<()>,
    {
        match name {
            b"propstat" => {
                if let (Some(response), Some(propstat)) = (self.response.as_mut(), self.propstat.take()) {
                    response.propstats.push(propstat);
                }
            }
            b"response" => {
                if let Some(response) = self.response.take() {
                    on_response(response)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(current) = self.stack.last() else { return };

        if let Some(propstat) = self.propstat.as_mut() {
            let field = match current.as_slice() {
                b"status" => &mut propstat.status,
                b"displayname" => &mut propstat.display_name,
                b"getcontentlength" => &mut propstat.content_length,
                b"getcontenttype" => &mut propstat.content_type,
                b"getlastmodified" => &mut propstat.last_modified,
                b"getetag" => &mut propstat.etag,
                _ => return,
            };
            field.push_str(text);
        } else if let Some(response) = self.response.as_mut() {
            if current.as_slice() == b"href" {
                response.href.push_str(text);
            }
        }
    }

    fn parent_is(&self, name: &[u8]) -> bool {
        self.stack.last().is_some_and(|top| top.as_slice() == name)
    }
}
