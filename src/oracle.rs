// File: oracle.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::debug;
use serde::Serialize;
use std::fmt;

use crate::param::{HttpParam, SLOT_COUNT};

/// Field on which two targets fed the same input disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "field")]
pub enum Divergence {
    MessageCount { first: i32, second: i32 },
    MessageProcessed { first: i8, second: i8 },
    BodyLength { slot: usize, first: i64, second: i64 },
    ChunkedEncoding { slot: usize, first: i8, second: i8 },
    ContentLength { slot: usize, first: i64, second: i64 },
    ConsumedLength { slot: usize, first: i64, second: i64 },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::MessageCount { first, second } => {
                write!(f, "message count differs ({} vs {})", first, second)
            }
            Divergence::MessageProcessed { first, second } => {
                write!(f, "processed flag differs ({} vs {})", first, second)
            }
            Divergence::BodyLength { slot, first, second } => {
                write!(f, "body length of message {} differs ({} vs {})", slot, first, second)
            }
            Divergence::ChunkedEncoding { slot, first, second } => {
                write!(f, "chunked flag of message {} differs ({} vs {})", slot, first, second)
            }
            Divergence::ContentLength { slot, first, second } => {
                write!(f, "content length of message {} differs ({} vs {})", slot, first, second)
            }
            Divergence::ConsumedLength { slot, first, second } => {
                write!(f, "consumed length of message {} differs ({} vs {})", slot, first, second)
            }
        }
    }
}

/// Status values that say the message was rejected or never answered.
pub fn is_error_status(status: i16) -> bool {
    status == 0 || (400..600).contains(&status)
}

/// First disagreement between two blocks, in rule order.
///
/// Body length is compared for every slot. The remaining framing fields are
/// only compared for a slot where at least one side answered with a
/// non-error status, since two rejections may legitimately have parsed the
/// message differently.
pub fn compare(first: &HttpParam, second: &HttpParam) -> Option<Divergence> {
    if first.message_count != second.message_count {
        return Some(Divergence::MessageCount {
            first: first.message_count,
            second: second.message_count,
        });
    }
    if first.message_processed != second.message_processed {
        return Some(Divergence::MessageProcessed {
            first: first.message_processed,
            second: second.message_processed,
        });
    }

    for slot in 0..SLOT_COUNT {
        if first.body_length[slot] != second.body_length[slot] {
            return Some(Divergence::BodyLength {
                slot,
                first: first.body_length[slot],
                second: second.body_length[slot],
            });
        }
        if is_error_status(first.status[slot]) && is_error_status(second.status[slot]) {
            continue;
        }
        if first.chunked_encoding[slot] != second.chunked_encoding[slot] {
            return Some(Divergence::ChunkedEncoding {
                slot,
                first: first.chunked_encoding[slot],
                second: second.chunked_encoding[slot],
            });
        }
        if first.content_length[slot] != second.content_length[slot] {
            return Some(Divergence::ContentLength {
                slot,
                first: first.content_length[slot],
                second: second.content_length[slot],
            });
        }
        if first.consumed_length[slot] != second.consumed_length[slot] {
            return Some(Divergence::ConsumedLength {
                slot,
                first: first.consumed_length[slot],
                second: second.consumed_length[slot],
            });
        }
    }
    None
}

/// Whether the pair of blocks marks the input as a desync candidate.
pub fn is_interesting(first: &HttpParam, second: &HttpParam) -> bool {
    match compare(first, second) {
        Some(divergence) => {
            debug!("Interesting input: {}", divergence);
            debug!("First: {:?}", first);
            debug!("Second: {:?}", second);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn answered(status: i16) -> HttpParam {
        let mut param = HttpParam::new();
        param.content_length[0] = 5;
        param.consumed_length[0] = 45;
        param.body_length[0] = 5;
        param.status[0] = status;
        param
    }

    #[test]
    fn test_identical_blocks_agree() {
        assert_eq!(compare(&answered(200), &answered(200)), None);
        assert!(!is_interesting(&HttpParam::new(), &HttpParam::new()));
    }

    #[test]
    fn test_message_count_checked_first() {
        let first = answered(200);
        let mut second = answered(200);
        second.message_count = 1;
        second.body_length[0] = 9;
        assert_eq!(
            compare(&first, &second),
            Some(Divergence::MessageCount { first: 0, second: 1 })
        );
    }

    #[test]
    fn test_processed_flag_differs() {
        let first = answered(200);
        let mut second = answered(200);
        second.message_processed = 1;
        assert!(matches!(
            compare(&first, &second),
            Some(Divergence::MessageProcessed { .. })
        ));
    }

    #[test]
    fn test_body_length_compared_even_for_errors() {
        let first = answered(400);
        let mut second = answered(502);
        second.body_length[0] = 0;
        assert_eq!(
            compare(&first, &second),
            Some(Divergence::BodyLength { slot: 0, first: 5, second: 0 })
        );
    }

    #[rstest]
    #[case(400, 500)]
    #[case(0, 404)]
    #[case(0, 0)]
    fn test_framing_ignored_when_both_error(#[case] a: i16, #[case] b: i16) {
        let first = answered(a);
        let mut second = answered(b);
        second.content_length[0] = 7;
        second.chunked_encoding[0] = 1;
        second.consumed_length[0] = 1;
        assert_eq!(compare(&first, &second), None);
    }

    #[rstest]
    #[case(200, 400)]
    #[case(302, 0)]
    #[case(200, 200)]
    fn test_framing_compared_when_one_side_succeeds(#[case] a: i16, #[case] b: i16) {
        let first = answered(a);
        let mut second = answered(b);
        second.content_length[0] = 7;
        assert_eq!(
            compare(&first, &second),
            Some(Divergence::ContentLength { slot: 0, first: 5, second: 7 })
        );
    }

    #[test]
    fn test_later_slot_reported_with_index() {
        let mut first = answered(200);
        let mut second = answered(200);
        first.status[3] = 200;
        second.status[3] = 200;
        second.consumed_length[3] = 12;
        assert_eq!(
            compare(&first, &second),
            Some(Divergence::ConsumedLength { slot: 3, first: -1, second: 12 })
        );
        assert!(compare(&first, &second)
            .unwrap()
            .to_string()
            .contains("message 3"));
    }

    #[rstest]
    #[case(0, true)]
    #[case(200, false)]
    #[case(399, false)]
    #[case(400, true)]
    #[case(599, true)]
    #[case(600, false)]
    fn test_is_error_status(#[case] status: i16, #[case] expected: bool) {
        assert_eq!(is_error_status(status), expected);
    }
}
