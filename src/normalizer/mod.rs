use html_escape::decode_html_entities;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::app::{GatorError, Result};

/// Bytes of the payload quoted in parse errors.
const ERROR_PREFIX_LEN: usize = 64;

/// Channel metadata and items of an RSS document, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
}

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse an RSS 2.0 document and unescape HTML entities in titles and
    /// descriptions.
    pub fn parse(&self, body: &[u8]) -> Result<ParsedFeed> {
        let mut feed = parse_rss(body)?;
        unescape_html(&mut feed);
        Ok(feed)
    }
}

fn unescape_html(feed: &mut ParsedFeed) {
    feed.title = decode_html_entities(&feed.title).into_owned();
    feed.description = decode_html_entities(&feed.description).into_owned();

    for item in &mut feed.items {
        for field in [&mut item.title, &mut item.description] {
            if let Some(text) = field.as_mut() {
                *text = decode_html_entities(text).into_owned();
            }
        }
    }
}

fn parse_rss(body: &[u8]) -> Result<ParsedFeed> {
    let mut reader = Reader::from_reader(body);

    let mut builder = RssBuilder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => builder.start(e.name().as_ref()),
            Ok(Event::Empty(e)) => {
                builder.start(e.name().as_ref());
                builder.end();
            }
            Ok(Event::End(_)) => builder.end(),
            Ok(Event::Text(e)) => {
                // Non-XML entities such as `&nbsp;` are left for the HTML pass.
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(&e).into_owned(),
                };
                builder.text(&text);
            }
            Ok(Event::CData(e)) => builder.text(&String::from_utf8_lossy(&e)),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(parse_error(
                    body,
                    format!("malformed XML at byte {}: {}", reader.buffer_position(), e),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    builder.finish().map_err(|reason| parse_error(body, reason))
}

fn parse_error(body: &[u8], reason: String) -> GatorError {
    let prefix = &body[..body.len().min(ERROR_PREFIX_LEN)];
    GatorError::FeedParse {
        reason,
        size: body.len(),
        prefix: String::from_utf8_lossy(prefix).into_owned(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

/// Text being collected for a channel or item field, including text of
/// nested markup until the field's element closes.
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

#[derive(Default)]
struct RssBuilder {
    stack: Vec<Vec<u8>>,
    channel: Option<ParsedFeed>,
    item: Option<ParsedItem>,
    capture: Option<Capture>,
}

impl RssBuilder {
    fn start(&mut self, name: &[u8]) {
        let parent = self.stack.last().map(Vec::as_slice);

        match (name, parent) {
            (b"channel", None | Some(b"rss")) if self.channel.is_none() => {
                self.channel = Some(ParsedFeed::default());
            }
            (b"item", Some(b"channel")) if self.channel.is_some() && self.capture.is_none() => {
                self.item = Some(ParsedItem::default());
            }
            _ => {
                let in_scope = match parent {
                    Some(b"item") => self.item.is_some(),
                    Some(b"channel") => self.channel.is_some() && self.item.is_none(),
                    _ => false,
                };
                if in_scope && self.capture.is_none() {
                    if let Some(field) = Field::from_name(name) {
                        self.capture = Some(Capture {
                            field,
                            depth: self.stack.len() + 1,
                            text: String::new(),
                        });
                    }
                }
            }
        }

        self.stack.push(name.to_vec());
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    fn end(&mut self) {
        let depth = self.stack.len();
        let Some(name) = self.stack.pop() else {
            return;
        };

        if self.capture.as_ref().is_some_and(|c| c.depth == depth) {
            if let Some(capture) = self.capture.take() {
                self.commit(capture.field, capture.text.trim().to_string());
            }
            return;
        }

        if name == b"item" && self.stack.last().map(Vec::as_slice) == Some(&b"channel"[..]) {
            if let (Some(item), Some(channel)) = (self.item.take(), self.channel.as_mut()) {
                channel.items.push(item);
            }
        }
    }

    fn commit(&mut self, field: Field, text: String) {
        if let Some(item) = self.item.as_mut() {
            let slot = match field {
                Field::Title => &mut item.title,
                Field::Link => &mut item.link,
                Field::Description => &mut item.description,
                Field::PubDate => &mut item.pub_date,
            };
            *slot = Some(text);
        } else if let Some(channel) = self.channel.as_mut() {
            match field {
                Field::Title => channel.title = text,
                Field::Link => channel.link = text,
                Field::Description => channel.description = text,
                Field::PubDate => {}
            }
        }
    }

    fn finish(self) -> std::result::Result<ParsedFeed, String> {
        if let Some(open) = self.stack.last() {
            return Err(format!(
                "document ended inside <{}>",
                String::from_utf8_lossy(open)
            ));
        }
        self.channel
            .ok_or_else(|| "missing <channel> element".to_string())
    }
}
