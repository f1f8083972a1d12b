//! Reading server-sent events.

#[cfg(test)]
use std::collections::VecDeque;

use bytes::Bytes;
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Transport(String),
    InvalidPayload,
}

enum Body {
    Response(Response),
    #[cfg(test)]
    Preset(VecDeque<Bytes>),
}

impl Body {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        match self {
            Body::Response(response) => response
                .chunk()
                .await
                .map_err(|err| Error::Transport(err.to_string())),
            #[cfg(test)]
            Body::Preset(chunks) => Ok(chunks.pop_front()),
        }
    }
}

/// A type for reading server-sent events from a response body.
///
/// Only the `data` field is kept. Comments and other fields are skipped,
/// and events without data are not reported.
pub struct Sse {
    buf: Vec<u8>,
    body: Body,
}

impl Sse {
    #[inline]
    pub fn from_response(response: Response) -> Self {
        Self::new(Body::Response(response))
    }

    #[cfg(test)]
    pub fn from_chunks<I: IntoIterator<Item = Bytes>>(chunks: I) -> Self {
        Self::new(Body::Preset(chunks.into_iter().collect()))
    }

    fn new(body: Body) -> Self {
        Self {
            buf: Vec::new(),
            body,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // There may be buffered events left from the previous chunk.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) = self.body.next_chunk().await? else {
                return Ok(None);
            };
            self.buf.extend_from_slice(&bytes);
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        while let Some(end) = block_end(&self.buf) {
            let block: Vec<u8> = self.buf.drain(0..end).collect();
            // Blocks end on a blank line, so no character is cut in half.
            let Ok(block) = str::from_utf8(&block) else {
                return Err(Error::InvalidPayload);
            };

            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (name, value) = line.split_once(':').unwrap_or((line, ""));
                if name != "data" {
                    continue;
                }
                let value = value.strip_prefix(' ').unwrap_or(value);
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }
            if data.is_some() {
                return Ok(data);
            }
        }
        Ok(None)
    }
}

/// Returns the length of the first complete event block, blank line
/// included. Both `\n\n` and `\r\n\r\n` end a block.
fn block_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (idx, byte) in buf.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        let line = &buf[line_start..idx];
        let blank = line.is_empty() || line == b"\r";
        if blank && line_start > 0 {
            return Some(idx + 1);
        }
        line_start = idx + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(chunks: &[&'static [u8]]) -> Sse {
        Sse::from_chunks(chunks.iter().copied().map(Bytes::from_static))
    }

    #[tokio::test]
    async fn test_normal_events() {
        let mut sse = sse(&[b"data: hello\n\n", b"data: bye\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let mut sse = sse(&[b"data:", b" hello\r", b"\n\r\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_payload() {
        let mut sse = sse(&[
            b": keep-alive\n\ndata: {\"text\": \"a: b\"}\r\n\r\n",
            b"event: ping\n\n",
        ]);
        assert_eq!(
            sse.next_event().await.unwrap().unwrap(),
            r#"{"text": "a: b"}"#
        );
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_characters() {
        let mut sse = sse(&[b"data: \xf0\x9f", b"\x8d\xab\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "🍫");
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let mut sse = sse(&[b"data: \xff\xfe\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        // Incomplete events are dropped at the end of the stream.
        let mut sse = self::sse(&[b"data: hello\n", b"data: bye\n"]);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
