//! Reconciliation pipeline tests
//!
//! Drive frames through decoding, classification, planning and application
//! the way the coordinator and replay reconciler do, and check the ordering
//! guarantees of the resulting turns:
//! - chronological order of first occurrences
//! - duplicate delivery adds nothing
//! - every appended segment gets a fresh position
//! - late (batched) application gives the same order as immediate
//! - a live turn and its replay render the same

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use threadline_core::events::{
    ContentEvent, ReasoningChunk, TextChunk, TodoItem, TodoStatus, TodoUpdate, ToolCall,
    ToolCallResult,
};
use threadline_core::sse::{decode_stream, SseFrame};
use threadline_core::transport::encode_frame;
use threadline_core::{
    render_blocks, ChatEvent, MarkerKey, ReplayReconciler, RenderBlock, Segment, ThreadId,
    Transcript, Turn, TurnId, TurnUpdate,
};

// =============================================================================
// Helpers
// =============================================================================

fn text(content: &str) -> ContentEvent {
    ContentEvent::Text(TextChunk {
        content: content.to_string(),
    })
}

fn reasoning(id: &str, content: &str) -> ContentEvent {
    ContentEvent::Reasoning(ReasoningChunk {
        id: id.to_string(),
        content: content.to_string(),
    })
}

fn tool_call(id: &str) -> ContentEvent {
    ContentEvent::ToolCall(ToolCall {
        id: id.to_string(),
        name: "lookup".to_string(),
        arguments: json!({"q": id}),
    })
}

fn todo(id: &str, done: usize) -> ContentEvent {
    ContentEvent::TodoUpdate(TodoUpdate {
        id: id.to_string(),
        todos: (0..2)
            .map(|i| TodoItem {
                content: format!("step {i}"),
                status: if i < done {
                    TodoStatus::Completed
                } else {
                    TodoStatus::Pending
                },
            })
            .collect(),
        total: None,
        completed: None,
        in_progress: None,
        pending: None,
    })
}

fn streaming_turn() -> Turn {
    let mut turn = Turn::new(TurnId::new("live"), "question");
    turn.begin_sending().unwrap();
    turn.begin_streaming().unwrap();
    turn
}

fn feed_immediately(turn: &mut Turn, events: Vec<ContentEvent>) {
    for event in events {
        if let Some(update) = turn.plan(None, event) {
            turn.apply(update);
        }
    }
}

fn feed_deferred(turn: &mut Turn, events: Vec<ContentEvent>) {
    let queued: Vec<TurnUpdate> = events
        .into_iter()
        .filter_map(|event| turn.plan(None, event))
        .collect();
    for update in queued {
        turn.apply(update);
    }
}

/// Key a segment by what it refers to, for order comparisons
fn segment_key(segment: &Segment) -> String {
    match segment.marker_key() {
        Some(key) => key.to_string(),
        None => match segment {
            Segment::Text { content, .. } => format!("text:{content}"),
            _ => unreachable!(),
        },
    }
}

fn sorted_keys(turn: &Turn) -> Vec<String> {
    let mut segments = turn.response.segments.clone();
    segments.sort_by_key(Segment::position);
    segments.iter().map(segment_key).collect()
}

/// Small deterministic generator for interleavings
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((self.0 >> 33) as usize) % bound
    }
}

fn random_events(seed: u64, len: usize) -> Vec<ContentEvent> {
    let mut rng = Lcg(seed);
    (0..len)
        .map(|i| match rng.next(4) {
            0 => text(&format!("t{i}")),
            1 => reasoning(&format!("r{}", rng.next(3)), "x"),
            2 => tool_call(&format!("c{}", rng.next(3))),
            _ => todo(&format!("l{}", rng.next(2)), rng.next(3)),
        })
        .collect()
}

fn first_occurrence_keys(events: &[ContentEvent]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for event in events {
        let key = match event {
            ContentEvent::Text(chunk) => format!("text:{}", chunk.content),
            ContentEvent::Reasoning(chunk) => MarkerKey::Reasoning(chunk.id.clone()).to_string(),
            ContentEvent::ReasoningComplete(done) => {
                MarkerKey::Reasoning(done.id.clone()).to_string()
            }
            ContentEvent::ToolCall(call) => MarkerKey::ToolCall(call.id.clone()).to_string(),
            ContentEvent::ToolCallResult(result) => {
                MarkerKey::ToolCall(result.id.clone()).to_string()
            }
            ContentEvent::TodoUpdate(update) => MarkerKey::TaskList(update.id.clone()).to_string(),
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_sorted_segments_follow_first_occurrence_order() {
    for seed in 1..=40 {
        let events = random_events(seed, 30);
        let expected = first_occurrence_keys(&events);

        let mut turn = streaming_turn();
        feed_immediately(&mut turn, events);

        assert_eq!(sorted_keys(&turn), expected, "seed {seed}");
    }
}

#[test]
fn test_redelivered_sequence_adds_no_markers() {
    for seed in 1..=20 {
        let events: Vec<ContentEvent> = random_events(seed, 25)
            .into_iter()
            .filter(|event| !matches!(event, ContentEvent::Text(_)))
            .collect();

        let mut once = streaming_turn();
        feed_immediately(&mut once, events.clone());

        let mut twice = streaming_turn();
        feed_immediately(&mut twice, events.clone());
        feed_immediately(&mut twice, events);

        assert_eq!(once.response.segments, twice.response.segments, "seed {seed}");
        assert_eq!(once.position_counter(), twice.position_counter());
    }
}

#[test]
fn test_every_appended_segment_gets_the_next_position() {
    let events: Vec<ContentEvent> = (0..50)
        .map(|i| match i % 4 {
            0 => text(&format!("t{i}")),
            1 => reasoning(&format!("r{i}"), "x"),
            2 => tool_call(&format!("c{i}")),
            _ => todo(&format!("l{i}"), 0),
        })
        .collect();

    let mut turn = streaming_turn();
    feed_immediately(&mut turn, events);

    assert_eq!(turn.position_counter(), 50);
    let mut positions: Vec<u64> = turn
        .response
        .segments
        .iter()
        .map(Segment::position)
        .collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=50).collect::<Vec<u64>>());
}

#[test]
fn test_deferred_application_matches_immediate() {
    for seed in 1..=40 {
        let events = random_events(seed, 30);

        let mut immediate = streaming_turn();
        feed_immediately(&mut immediate, events.clone());

        let mut deferred = streaming_turn();
        feed_deferred(&mut deferred, events);

        assert_eq!(
            immediate.response.segments, deferred.response.segments,
            "seed {seed}"
        );
        assert_eq!(sorted_keys(&immediate), sorted_keys(&deferred));
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_interleaved_text_reasoning_and_task_list() {
    let mut turn = streaming_turn();
    feed_deferred(
        &mut turn,
        vec![
            text("Hello "),
            reasoning("r1", "thinking"),
            text("world"),
            ContentEvent::TodoUpdate(TodoUpdate {
                id: "t1".to_string(),
                todos: Vec::new(),
                total: Some(2),
                completed: Some(1),
                in_progress: None,
                pending: None,
            }),
            text("!"),
        ],
    );

    assert_eq!(
        sorted_keys(&turn),
        vec![
            "text:Hello ".to_string(),
            "reasoning:r1".to_string(),
            "text:world".to_string(),
            "task_list:t1".to_string(),
            "text:!".to_string(),
        ]
    );

    let blocks = turn.render().unwrap();
    assert_eq!(blocks.len(), 5);
    match blocks[3] {
        RenderBlock::TaskList(list) => {
            assert_eq!(list.snapshot.counts.total, 2);
            assert_eq!(list.snapshot.counts.completed, 1);
        }
        ref other => panic!("expected task list, got {other:?}"),
    }
}

#[test]
fn test_adjacent_text_merges_only_when_rendering() {
    let mut turn = streaming_turn();
    feed_immediately(&mut turn, vec![text("a"), text("b"), tool_call("c1"), text("c")]);

    assert_eq!(turn.response.segments.len(), 4);
    let blocks = turn.render().unwrap();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0], RenderBlock::Text("ab".to_string()));
    assert_eq!(blocks[2], RenderBlock::Text("c".to_string()));
}

#[test]
fn test_orphan_tool_result_renders_one_marker() {
    let mut turn = streaming_turn();
    feed_immediately(
        &mut turn,
        vec![ContentEvent::ToolCallResult(ToolCallResult {
            id: "c7".to_string(),
            name: None,
            result: json!("ok"),
            is_error: false,
        })],
    );

    assert_eq!(turn.response.segments.len(), 1);
    let blocks = turn.render().unwrap();
    match blocks[0] {
        RenderBlock::ToolCall(call) => {
            assert!(call.complete);
            assert_eq!(call.result, Some(json!("ok")));
        }
        ref other => panic!("expected tool call, got {other:?}"),
    }
}

#[test]
fn test_render_rejects_position_ties() {
    let segments = vec![
        Segment::Text {
            content: "a".to_string(),
            position: 2,
        },
        MarkerKey::Reasoning("r".to_string()).into_segment(2),
    ];
    let turn = streaming_turn();
    assert!(render_blocks(&segments, &turn.response.processes).is_err());
}

// =============================================================================
// Live / replay round trip
// =============================================================================

fn wire(frames: &[SseFrame]) -> Vec<u8> {
    frames
        .iter()
        .map(encode_frame)
        .collect::<String>()
        .into_bytes()
}

fn persisted_turn_frames() -> Vec<SseFrame> {
    vec![
        SseFrame::new("text_chunk", json!({"content": "Let me check. "})),
        SseFrame::new("reasoning_chunk", json!({"id": "r1", "content": "need quote"})),
        SseFrame::new(
            "tool_call",
            json!({"id": "c1", "name": "get_quote", "arguments": {"symbol": "MSFT"}}),
        ),
        SseFrame::new(
            "tool_call_result",
            json!({"id": "c1", "result": {"price": 411.2}}),
        ),
        SseFrame::new("reasoning_complete", json!({"id": "r1"})),
        SseFrame::new(
            "todo_update",
            json!({"id": "t1", "todos": [{"content": "quote", "status": "completed"}]}),
        ),
        SseFrame::new("text_chunk", json!({"content": "MSFT is at "})),
        SseFrame::new("text_chunk", json!({"content": "411.2."})),
        SseFrame::new("done", Value::Null),
    ]
}

#[tokio::test]
async fn test_live_turn_and_replay_render_identically() {
    // Live: decode in uneven chunks, plan as frames arrive, apply at the end
    let bytes = wire(&persisted_turn_frames());
    let chunks: Vec<Result<Vec<u8>, String>> =
        bytes.chunks(7).map(|chunk| Ok(chunk.to_vec())).collect();
    let mut frames = decode_stream(futures::stream::iter(chunks), 1024);

    let mut live = streaming_turn();
    let mut queued = Vec::new();
    while let Some(frame) = frames.next().await {
        if let Some(ChatEvent::Content(content)) = ChatEvent::from_frame(&frame).unwrap() {
            queued.extend(live.plan(frame.id.as_deref(), content));
        }
    }
    for update in queued {
        live.apply(update);
    }
    live.complete().unwrap();

    // Replay: same events behind a user_message
    let mut feed = vec![SseFrame::new(
        "user_message",
        json!({"content": "question", "turn_id": "p1"}),
    )];
    feed.extend(persisted_turn_frames());
    let replay_frames = decode_stream(
        futures::stream::iter(vec![Ok::<_, String>(wire(&feed))]),
        1024,
    );
    let mut transcript = Transcript::new(ThreadId::assigned("t-1"));
    ReplayReconciler::reconcile(replay_frames, &mut transcript).await;

    let replayed = &transcript.turns()[0];
    assert!(replayed.response.historical);
    assert_eq!(replayed.user.content, live.user.content);
    assert_eq!(live.render().unwrap(), replayed.render().unwrap());
    assert_eq!(live.position_counter(), replayed.position_counter());
}
