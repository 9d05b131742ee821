use uuid::Uuid;

use parley_db::Database;
use parley_db::conversations::ConversationMark;
use parley_types::error::ChatError;
use parley_types::models::{
    ConversationKind, MediaAttachment, MediaKind, MessageDraft, NewConversation, ReceiptKind,
};

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

fn direct(db: &Database, a: Uuid, b: Uuid) -> Uuid {
    db.create_conversation(&NewConversation::new(ConversationKind::Direct, vec![a, b], None).unwrap())
        .unwrap()
        .id
}

fn send(db: &Database, conv: Uuid, sender: Uuid, content: &str) -> i64 {
    db.append_message(
        &MessageDraft::new(conv, sender, Some(content.into()), vec![], None, false).unwrap(),
    )
    .unwrap()
    .id
}

#[test]
fn append_to_locked_conversation_fails_and_stores_nothing() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);

    db.set_locked(conv, true).unwrap();
    let draft = MessageDraft::new(conv, a, Some("test".into()), vec![], None, false).unwrap();
    assert!(matches!(
        db.append_message(&draft),
        Err(ChatError::ConversationLocked)
    ));
    assert!(db.list_messages(conv, 10, None).unwrap().data.is_empty());

    db.set_locked(conv, false).unwrap();
    db.append_message(&draft).unwrap();
    assert_eq!(db.list_messages(conv, 10, None).unwrap().data.len(), 1);
}

#[test]
fn append_to_unknown_conversation_fails() {
    let db = db();
    let draft =
        MessageDraft::new(Uuid::new_v4(), Uuid::new_v4(), Some("hi".into()), vec![], None, false)
            .unwrap();
    assert!(matches!(
        db.append_message(&draft),
        Err(ChatError::ConversationNotFound)
    ));
}

#[test]
fn media_only_message_is_accepted() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);

    let media = vec![MediaAttachment {
        key: "uploads/1".into(),
        url: "https://files.example/uploads/1".into(),
        kind: MediaKind::Image,
        size: 2048,
    }];
    let msg = db
        .append_message(&MessageDraft::new(conv, a, None, media, None, false).unwrap())
        .unwrap();
    assert!(msg.content.is_none());
    assert_eq!(msg.media.len(), 1);
}

#[test]
fn message_ids_are_strictly_increasing_within_a_conversation() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);

    let mut last = 0;
    for i in 0..10 {
        let id = send(&db, conv, a, &format!("m{i}"));
        assert!(id > last);
        last = id;
    }
}

#[test]
fn pagination_walk_yields_every_message_once_in_order() {
    for n in [0usize, 1, 7, 35] {
        for k in 1..=(n as u32 + 5) {
            let db = db();
            let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
            let conv = direct(&db, a, b);
            let sent: Vec<i64> = (0..n).map(|i| send(&db, conv, a, &format!("m{i}"))).collect();

            let mut collected = Vec::new();
            let mut cursor = None;
            loop {
                let page = db.list_messages(conv, k, cursor).unwrap();
                assert!(page.data.len() <= k as usize);
                // pages arrive newest-first overall, each in ascending order
                let mut ids: Vec<i64> = page.data.iter().map(|m| m.id).collect();
                let mut sorted = ids.clone();
                sorted.sort();
                assert_eq!(ids, sorted, "page not ascending (n={n}, k={k})");
                collected.append(&mut ids);
                match page.next_cursor {
                    Some(c) => cursor = Some(c),
                    None => break,
                }
            }

            // walking backward pages then flattening gives reverse-chronological
            // blocks; reassemble chronological order for comparison
            let mut chronological = collected.clone();
            chronological.sort();
            let mut dedup = chronological.clone();
            dedup.dedup();
            assert_eq!(dedup.len(), n, "duplicates or gaps (n={n}, k={k})");
            assert_eq!(chronological, sent, "missing messages (n={n}, k={k})");
        }
    }
}

#[test]
fn pagination_two_page_walk_over_35_messages() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    for i in 0..35 {
        send(&db, conv, a, &format!("m{i}"));
    }

    let first = db.list_messages(conv, 30, None).unwrap();
    assert_eq!(first.data.len(), 30);
    let cursor = first.next_cursor.expect("a second page must exist");

    let second = db.list_messages(conv, 30, Some(cursor)).unwrap();
    assert_eq!(second.data.len(), 5);
    assert!(second.next_cursor.is_none());

    // the second page holds the 5 oldest, the first page the 30 newest
    assert!(second.data.last().unwrap().id < first.data.first().unwrap().id);
}

#[test]
fn duplicate_direct_pair_returns_the_same_conversation() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let first = direct(&db, a, b);
    let again = direct(&db, a, b);
    let reversed = direct(&db, b, a);
    assert_eq!(first, again);
    assert_eq!(first, reversed);

    assert_eq!(db.list_conversations(a).unwrap().len(), 1);
}

#[test]
fn reaction_add_then_remove_restores_original_state() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let msg = send(&db, conv, a, "hello");

    let (_, added) = db.add_reaction(msg, b, "👍").unwrap();
    assert!(added);
    // second add is a no-op, not a removal
    let (_, added_again) = db.add_reaction(msg, b, "👍").unwrap();
    assert!(!added_again);
    assert_eq!(db.get_message(msg).unwrap().reactions.len(), 1);

    let (_, removed) = db.remove_reaction(msg, b, "👍").unwrap();
    assert!(removed);
    let (_, removed_again) = db.remove_reaction(msg, b, "👍").unwrap();
    assert!(!removed_again);
    assert!(db.get_message(msg).unwrap().reactions.is_empty());
}

#[test]
fn reaction_groups_are_deterministically_ordered() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let msg = send(&db, conv, a, "hello");

    db.add_reaction(msg, b, "🎉").unwrap();
    db.add_reaction(msg, a, "👍").unwrap();
    db.add_reaction(msg, b, "👍").unwrap();

    let groups = db.get_message(msg).unwrap().reactions;
    let emojis: Vec<&str> = groups.iter().map(|g| g.emoji.as_str()).collect();
    let mut sorted = emojis.clone();
    sorted.sort();
    assert_eq!(emojis, sorted);

    let thumbs = groups.iter().find(|g| g.emoji == "👍").unwrap();
    assert_eq!(thumbs.count, 2);
    let mut users = thumbs.user_ids.clone();
    users.sort();
    assert_eq!(thumbs.user_ids, users);
}

#[test]
fn receipts_merge_with_set_semantics() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let m1 = send(&db, conv, a, "one");
    let m2 = send(&db, conv, a, "two");

    let applied = db
        .merge_receipts(conv, b, &[m1, m2], ReceiptKind::Delivered)
        .unwrap();
    assert_eq!(applied, vec![m1, m2]);

    // merging again changes nothing
    db.merge_receipts(conv, b, &[m1, m2], ReceiptKind::Delivered)
        .unwrap();
    let msg = db.get_message(m1).unwrap();
    assert_eq!(msg.delivered_to, vec![b]);
    assert!(msg.read_by.is_empty());

    db.merge_receipts(conv, b, &[m1], ReceiptKind::Read).unwrap();
    assert_eq!(db.get_message(m1).unwrap().read_by, vec![b]);

    // ids outside the conversation are skipped
    let other = direct(&db, a, Uuid::new_v4());
    let foreign = send(&db, other, a, "elsewhere");
    let applied = db
        .merge_receipts(conv, b, &[foreign], ReceiptKind::Read)
        .unwrap();
    assert!(applied.is_empty());
    assert!(db.get_message(foreign).unwrap().read_by.is_empty());
}

#[test]
fn soft_delete_redacts_content_but_keeps_position() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let m1 = send(&db, conv, a, "first");
    let m2 = send(&db, conv, a, "second");

    db.soft_delete_message(m1, a, false).unwrap();

    let page = db.list_messages(conv, 10, None).unwrap();
    assert_eq!(page.data.len(), 2);
    let deleted = &page.data[0];
    assert_eq!(deleted.id, m1);
    assert!(deleted.content.is_none());
    assert!(deleted.media.is_empty());
    assert!(deleted.deleted_at.is_some());
    assert_eq!(page.data[1].id, m2);
    assert_eq!(page.data[1].content.as_deref(), Some("second"));
}

#[test]
fn soft_delete_requires_sender_or_privilege() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let msg = send(&db, conv, a, "mine");

    assert!(matches!(
        db.soft_delete_message(msg, b, false),
        Err(ChatError::Forbidden)
    ));
    // a moderator may delete anyone's message
    db.soft_delete_message(msg, b, true).unwrap();
    assert!(db.get_message(msg).unwrap().deleted_at.is_some());
}

#[test]
fn edit_is_sender_only_and_stamps_edited_at() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let msg = send(&db, conv, a, "draft");

    assert!(matches!(
        db.edit_message(msg, b, Some("hijack".into()), None),
        Err(ChatError::Forbidden)
    ));

    let edited = db.edit_message(msg, a, Some("final".into()), Some(true)).unwrap();
    assert_eq!(edited.content.as_deref(), Some("final"));
    assert!(edited.pinned);
    assert!(edited.edited_at.is_some());
}

#[test]
fn delete_conversation_cascades_to_messages() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let msg = send(&db, conv, a, "going away");
    db.add_reaction(msg, b, "👀").unwrap();

    db.delete_conversation(conv).unwrap();

    assert!(matches!(
        db.get_conversation(conv),
        Err(ChatError::ConversationNotFound)
    ));
    assert!(matches!(
        db.get_message(msg),
        Err(ChatError::MessageNotFound)
    ));
    assert!(matches!(
        db.delete_conversation(conv),
        Err(ChatError::ConversationNotFound)
    ));
}

#[test]
fn activity_reorders_conversation_list() {
    let db = db();
    let a = Uuid::new_v4();
    let old = direct(&db, a, Uuid::new_v4());
    let recent = direct(&db, a, Uuid::new_v4());

    let listed = db.list_conversations(a).unwrap();
    assert_eq!(listed[0].id, recent);

    // a new message in the older conversation bumps it to the top
    send(&db, old, a, "ping");
    let listed = db.list_conversations(a).unwrap();
    assert_eq!(listed[0].id, old);
}

#[test]
fn marks_are_idempotent_sets() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);

    db.set_mark(conv, a, ConversationMark::Pinned).unwrap();
    let again = db.set_mark(conv, a, ConversationMark::Pinned).unwrap();
    assert_eq!(again.pinned_by, vec![a]);

    db.clear_mark(conv, a, ConversationMark::Pinned).unwrap();
    let cleared = db.clear_mark(conv, a, ConversationMark::Pinned).unwrap();
    assert!(cleared.pinned_by.is_empty());

    let archived = db.set_mark(conv, b, ConversationMark::Archived).unwrap();
    assert_eq!(archived.archived_by, vec![b]);
}

#[test]
fn reply_reference_survives_target_soft_delete() {
    let db = db();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let conv = direct(&db, a, b);
    let original = send(&db, conv, a, "original");

    let reply = db
        .append_message(
            &MessageDraft::new(conv, b, Some("reply".into()), vec![], Some(original), false)
                .unwrap(),
        )
        .unwrap();
    assert_eq!(reply.reply_to_message_id, Some(original));

    db.soft_delete_message(original, a, false).unwrap();
    assert_eq!(
        db.get_message(reply.id).unwrap().reply_to_message_id,
        Some(original)
    );
}
