use bytes::Bytes;

/// One opaque unit of chat traffic. Broadcast verbatim; the server never
/// looks inside or wraps it in an envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_len() {
        let frame = Frame::from("hello");
        assert_eq!(frame.len(), 5);
        assert_eq!(frame, Frame::Text("hello".into()));
    }

    #[test]
    fn bytes_become_binary_frame() {
        let frame = Frame::from(vec![0u8, 1, 2]);
        assert_eq!(frame.len(), 3);
        assert!(matches!(frame, Frame::Binary(_)));
    }

    #[test]
    fn empty_frame() {
        assert!(Frame::from(String::new()).is_empty());
    }
}
