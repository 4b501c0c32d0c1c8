//! Incremental translation of a provider SSE byte stream into assistant SSE frames.
//!
//! The [`StreamTranscoder`] is fed raw network chunks, which may split a line
//! anywhere (including inside a multi-byte character). It keeps the unfinished
//! tail between calls and only interprets complete lines.
//!
//! Usage:
//!   let mut transcoder = StreamTranscoder::new();
//!   for chunk in provider_chunks {
//!       for frame in transcoder.push(&chunk) {
//!           // write frame.to_sse()
//!       }
//!   }
//!   let trailing = transcoder.finish();

use super::assistant_types::StreamEvent;
use super::provider_types::ChatCompletionChunk;

const DONE_MARKER: &str = "[DONE]";

/// One ready-to-send frame of the assistant stream.
#[derive(Debug, Clone)]
pub enum SseFrame {
    Event(StreamEvent),
    Done,
}

impl SseFrame {
    pub fn to_sse(&self) -> String {
        match self {
            SseFrame::Event(event) => {
                format!("data: {}\n\n", serde_json::to_string(event).unwrap_or_default())
            }
            SseFrame::Done => format!("data: {DONE_MARKER}\n\n"),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, SseFrame::Done)
    }
}

impl From<StreamEvent> for SseFrame {
    fn from(event: StreamEvent) -> Self {
        SseFrame::Event(event)
    }
}

#[derive(Debug, Default)]
pub struct StreamTranscoder {
    buffer: Vec<u8>,
    done: bool,
    diagnostics: Vec<String>,
}

impl StreamTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning the frames completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.done {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(frame) = self.process_line(&line) {
                let done = frame.is_done();
                frames.push(frame);
                if done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Flush a final line the provider did not terminate with a newline.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.done || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.process_line(&line).into_iter().collect()
    }

    /// Whether the provider's `[DONE]` marker has been forwarded.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Drain the notes recorded for lines that were dropped.
    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<SseFrame> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end();
        if line.is_empty() {
            return None;
        }

        let data = line.strip_prefix("data:")?;
        let data = data.strip_prefix(' ').unwrap_or(data);

        if data == DONE_MARKER {
            self.done = true;
            return Some(SseFrame::Done);
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                self.diagnostics
                    .push(format!("Skipping unparseable chunk: {e}"));
                return None;
            }
        };

        match chunk.text_delta() {
            Some(text) => Some(StreamEvent::text_delta(text).into()),
            None => {
                self.diagnostics
                    .push("Skipping chunk without delta content".to_string());
                None
            }
        }
    }
}

/// Translate a single self-contained chunk with a fresh transcoder.
pub fn transcode_chunk(chunk: &[u8]) -> Vec<SseFrame> {
    let mut transcoder = StreamTranscoder::new();
    let mut frames = transcoder.push(chunk);
    frames.extend(transcoder.finish());
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(frames: &[SseFrame]) -> Vec<String> {
        frames.iter().map(SseFrame::to_sse).collect()
    }

    #[test]
    fn test_single_delta() {
        let frames = render(&transcode_chunk(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
        ));

        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0],
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n"
        );
    }

    #[test]
    fn test_done_marker() {
        let frames = render(&transcode_chunk(b"data: [DONE]\n\n"));
        assert_eq!(frames, vec!["data: [DONE]\n\n".to_string()]);
    }

    #[test]
    fn test_malformed_json_emits_nothing() {
        let mut transcoder = StreamTranscoder::new();
        let frames = transcoder.push(b"data: {\"choices\":[{\"delta\":\n\n");

        assert!(frames.is_empty());
        assert_eq!(transcoder.take_diagnostics().len(), 1);
        assert!(transcoder.take_diagnostics().is_empty());
    }

    #[test]
    fn test_frames_without_content_are_dropped() {
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[]}\n\n",
            "data: {\"id\":\"x\"}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"},\"finish_reason\":\"stop\"}]}\n\n",
            ": keep-alive comment\n\n",
            "event: ping\n\n",
        );
        assert!(transcode_chunk(input.as_bytes()).is_empty());
    }

    #[test]
    fn test_several_frames_in_one_chunk_keep_order() {
        let input = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\r\n\r\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"c\"}}]}\n\n",
        );
        let frames = transcode_chunk(input.as_bytes());

        let texts: Vec<String> = frames
            .iter()
            .map(|f| match f {
                SseFrame::Event(StreamEvent::ContentBlockDelta { delta, .. }) => match delta {
                    crate::translate::assistant_types::Delta::TextDelta { text } => text.clone(),
                },
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_line_split_across_chunks_is_reassembled() {
        let mut transcoder = StreamTranscoder::new();

        assert!(transcoder
            .push(b"data: {\"choices\":[{\"delta\":{\"con")
            .is_empty());
        let frames = render(&transcoder.push(b"tent\":\"Hello\"}}]}\n\n"));

        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"text\":\"Hello\""));
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n\n";
        let bytes = line.as_bytes();
        let split = line.find('é').unwrap() + 1;

        let mut transcoder = StreamTranscoder::new();
        assert!(transcoder.push(&bytes[..split]).is_empty());
        let frames = render(&transcoder.push(&bytes[split..]));

        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("héllo"));
    }

    #[test]
    fn test_nothing_after_done() {
        let mut transcoder = StreamTranscoder::new();
        let frames = transcoder.push(
            b"data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n",
        );

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_done());
        assert!(transcoder.is_done());
        assert!(transcoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n\n")
            .is_empty());
        assert!(transcoder.finish().is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut transcoder = StreamTranscoder::new();
        assert!(transcoder
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}")
            .is_empty());

        let frames = render(&transcoder.finish());
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"text\":\"tail\""));
    }
}
