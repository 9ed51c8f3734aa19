// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cursor-style sources of items for the payload builder.

use serde::Serialize;

use crate::errors::MarshalError;
use crate::message::MessageMetadata;

/// A cursor over a sequence of items that can be rendered one at a time.
///
/// The cursor starts before the first item: [`ItemSource::move_next`] must be called once before
/// the first item is accessed. The sequence may be finite or unbounded; the builder only drives it
/// forward and never restarts it.
pub trait ItemSource {
    /// Writes the bytes preceding the first item of every payload.
    fn write_header(&self, out: &mut Vec<u8>) -> Result<(), MarshalError>;

    /// Writes the bytes following the last item of every payload.
    fn write_footer(&self, out: &mut Vec<u8>) -> Result<(), MarshalError>;

    /// Advances to the next item and returns whether there is one.
    fn move_next(&mut self) -> bool;

    /// Renders the current item.
    fn write_current_item(&self, out: &mut Vec<u8>) -> Result<(), MarshalError>;

    /// Weight of the current item in the payload point count.
    fn current_item_point_count(&self) -> usize;

    /// Short description of the current item, for diagnostics.
    fn describe_current_item(&self) -> String;

    /// Bytes written between two consecutive items.
    fn separator(&self) -> &[u8] {
        b","
    }

    fn current_item_metadata(&self) -> MessageMetadata {
        MessageMetadata::default()
    }
}

/// An item rendered as one element of a JSON array.
pub trait JsonStreamItem: Serialize {
    fn point_count(&self) -> usize {
        1
    }

    fn describe(&self) -> String;
}

/// Renders a slice of items as a JSON array, optionally nested under a single key:
/// `[item,item]` or `{"series":[item,item]}`.
pub struct JsonArraySource<'a, T> {
    items: &'a [T],
    wrapper_key: Option<&'a str>,
    // None until the first move_next
    position: Option<usize>,
}

impl<'a, T: JsonStreamItem> JsonArraySource<'a, T> {
    #[must_use]
    pub fn new(items: &'a [T]) -> Self {
        Self {
            items,
            wrapper_key: None,
            position: None,
        }
    }

    #[must_use]
    pub fn with_wrapper_key(items: &'a [T], key: &'a str) -> Self {
        Self {
            items,
            wrapper_key: Some(key),
            position: None,
        }
    }

    fn current(&self) -> Option<&'a T> {
        self.position.and_then(|i| self.items.get(i))
    }
}

impl<T: JsonStreamItem> ItemSource for JsonArraySource<'_, T> {
    fn write_header(&self, out: &mut Vec<u8>) -> Result<(), MarshalError> {
        if let Some(key) = self.wrapper_key {
            out.push(b'{');
            serde_json::to_writer(&mut *out, key)?;
            out.extend_from_slice(b":[");
        } else {
            out.push(b'[');
        }
        Ok(())
    }

    fn write_footer(&self, out: &mut Vec<u8>) -> Result<(), MarshalError> {
        if self.wrapper_key.is_some() {
            out.extend_from_slice(b"]}");
        } else {
            out.push(b']');
        }
        Ok(())
    }

    fn move_next(&mut self) -> bool {
        let next = self.position.map_or(0, |i| i.saturating_add(1));
        self.position = Some(next.min(self.items.len()));
        next < self.items.len()
    }

    fn write_current_item(&self, out: &mut Vec<u8>) -> Result<(), MarshalError> {
        let item = self
            .current()
            .ok_or_else(|| MarshalError::Custom("no current item".to_string()))?;
        serde_json::to_writer(out, item)?;
        Ok(())
    }

    fn current_item_point_count(&self) -> usize {
        self.current().map_or(0, JsonStreamItem::point_count)
    }

    fn describe_current_item(&self) -> String {
        self.current()
            .map_or_else(|| "no current item".to_string(), JsonStreamItem::describe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Point {
        metric: &'static str,
        points: Vec<(i64, f64)>,
    }

    impl JsonStreamItem for Point {
        fn point_count(&self) -> usize {
            self.points.len()
        }

        fn describe(&self) -> String {
            format!("name {:?}, {} points", self.metric, self.points.len())
        }
    }

    fn render<S: ItemSource>(source: &mut S) -> Vec<u8> {
        let mut out = Vec::new();
        source.write_header(&mut out).unwrap();
        let mut first = true;
        while source.move_next() {
            if !first {
                out.extend_from_slice(source.separator());
            }
            source.write_current_item(&mut out).unwrap();
            first = false;
        }
        source.write_footer(&mut out).unwrap();
        out
    }

    #[test]
    fn test_json_array_source_renders_array() {
        let items = vec![
            Point {
                metric: "a",
                points: vec![(1, 1.0)],
            },
            Point {
                metric: "b",
                points: vec![(1, 2.0), (2, 3.0)],
            },
        ];
        let mut source = JsonArraySource::new(&items);
        let rendered = render(&mut source);
        assert_eq!(
            String::from_utf8(rendered).unwrap(),
            r#"[{"metric":"a","points":[[1,1.0]]},{"metric":"b","points":[[1,2.0],[2,3.0]]}]"#
        );
    }

    #[test]
    fn test_json_array_source_wrapper_key() {
        let items = vec![Point {
            metric: "a",
            points: vec![],
        }];
        let mut source = JsonArraySource::with_wrapper_key(&items, "series");
        let rendered = render(&mut source);
        let value: serde_json::Value = serde_json::from_slice(&rendered).unwrap();
        assert_eq!(value["series"][0]["metric"], "a");
    }

    #[test]
    fn test_json_array_source_cursor() {
        let items = vec![
            Point {
                metric: "a",
                points: vec![(1, 1.0)],
            },
            Point {
                metric: "b",
                points: vec![(1, 2.0), (2, 3.0)],
            },
        ];
        let mut source = JsonArraySource::new(&items);
        assert_eq!(source.describe_current_item(), "no current item");
        assert!(source.write_current_item(&mut Vec::new()).is_err());

        assert!(source.move_next());
        assert_eq!(source.current_item_point_count(), 1);
        assert!(source.move_next());
        assert_eq!(source.current_item_point_count(), 2);
        assert_eq!(source.describe_current_item(), "name \"b\", 2 points");
        assert!(!source.move_next());
        assert!(!source.move_next());
        assert_eq!(source.current_item_point_count(), 0);
    }

    #[test]
    fn test_empty_source() {
        let items: Vec<Point> = Vec::new();
        let mut source = JsonArraySource::new(&items);
        assert_eq!(render(&mut source), b"[]");
    }
}
