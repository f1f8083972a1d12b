//! Reading NDJSON bodies.

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

/// A type for reading newline-delimited records from a response body.
///
/// Blank lines are skipped. A trailing record without a line feed is still
/// reported when the body ends.
pub struct Lines {
    buf: Vec<u8>,
    body: Body,
    exhausted: bool,
}

impl Lines {
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
            exhausted: false,
        }
    }

    pub async fn next_line(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(line) = self.try_take_line()? {
                return Ok(Some(line));
            }
            if self.exhausted {
                return Ok(None);
            }

            match self.body.next_chunk().await? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => {
                    self.exhausted = true;
                    // Treat the rest as the last line.
                    self.buf.push(b'\n');
                }
            }
        }
    }

    fn try_take_line(&mut self) -> Result<Option<String>, Error> {
        // Decoding waits for a full line, a multi-byte character may be
        // split across chunks.
        while let Some(eol_idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(0..=eol_idx).collect();
            let Ok(line) = str::from_utf8(&line) else {
                return Err(Error::InvalidPayload);
            };
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_owned()));
            }
        }
        Ok(None)
    }
}
