//! Integration tests for the chat and message services against an
//! in-memory database.

use std::sync::Arc;

use ripple_server::error::ChatError;
use ripple_server::models::{Chat, ChatType, MemberRole, Message, MessageType};
use ripple_server::services::{
    ChatService, CreateChatParams, MessageService, SendMessageParams, UpdateChatParams,
};
use ripple_server::Database;

fn setup() -> (ChatService, MessageService) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    (ChatService::new(db.clone()), MessageService::new(db))
}

fn direct_params(a: &str, b: &str) -> CreateChatParams {
    CreateChatParams {
        chat_type: ChatType::Direct,
        members: vec![a.to_string(), b.to_string()],
        name: None,
        description: None,
    }
}

fn group_params(name: &str, members: &[&str]) -> CreateChatParams {
    CreateChatParams {
        chat_type: ChatType::Group,
        members: members.iter().map(|m| m.to_string()).collect(),
        name: Some(name.to_string()),
        description: None,
    }
}

fn send(messages: &MessageService, chat: &Chat, sender: &str, content: &str) -> Message {
    messages
        .create_message(
            sender,
            SendMessageParams {
                chat_id: chat.id.clone(),
                content: content.to_string(),
                message_type: MessageType::Text,
                reply_to: None,
                attachments: Vec::new(),
            },
        )
        .unwrap()
}

#[test]
fn test_direct_chat_creation_is_idempotent() {
    let (chats, _) = setup();

    let first = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    // Second attempt from the other side of the pair
    let second = chats.create_chat("bob", direct_params("bob", "alice")).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(chats.get_user_chats("alice").unwrap().len(), 1);
    assert_eq!(chats.get_user_chats("bob").unwrap().len(), 1);
}

#[test]
fn test_direct_chat_requires_exactly_two_members() {
    let (chats, _) = setup();

    let err = chats
        .create_chat(
            "alice",
            CreateChatParams {
                chat_type: ChatType::Direct,
                members: vec!["alice".to_string(), "bob".to_string(), "carol".to_string()],
                name: None,
                description: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[test]
fn test_group_chat_requires_a_name() {
    let (chats, _) = setup();

    let err = chats
        .create_chat(
            "alice",
            CreateChatParams {
                chat_type: ChatType::Group,
                members: vec!["alice".to_string(), "bob".to_string()],
                name: None,
                description: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[test]
fn test_creator_gets_admin_role() {
    let (chats, _) = setup();

    let chat = chats
        .create_chat("alice", group_params("team", &["alice", "bob"]))
        .unwrap();

    let alice = chat.active_member("alice").unwrap();
    let bob = chat.active_member("bob").unwrap();
    assert_eq!(alice.role, MemberRole::Admin);
    assert_eq!(bob.role, MemberRole::Member);
    assert!(!chat.settings.is_private);
}

#[test]
fn test_direct_chat_defaults_to_private() {
    let (chats, _) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    assert!(chat.settings.is_private);
}

#[test]
fn test_membership_gating_hides_existence() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();

    // Non-member and nonexistent id fail with the same error kind
    let non_member = chats.get_chat_by_id(&chat.id, "carol").unwrap_err();
    let missing = chats.get_chat_by_id("no-such-chat", "alice").unwrap_err();
    assert!(matches!(non_member, ChatError::NotFoundOrForbidden));
    assert!(matches!(missing, ChatError::NotFoundOrForbidden));

    let non_member = messages.get_chat_messages(&chat.id, "carol", 1, 10).unwrap_err();
    let missing = messages.get_chat_messages("no-such-chat", "alice", 1, 10).unwrap_err();
    assert!(matches!(non_member, ChatError::NotFoundOrForbidden));
    assert!(matches!(missing, ChatError::NotFoundOrForbidden));

    let params = SendMessageParams {
        chat_id: chat.id.clone(),
        content: "hi".to_string(),
        message_type: MessageType::Text,
        reply_to: None,
        attachments: Vec::new(),
    };
    let non_member = messages.create_message("carol", params.clone()).unwrap_err();
    let missing = messages
        .create_message(
            "alice",
            SendMessageParams {
                chat_id: "no-such-chat".to_string(),
                ..params
            },
        )
        .unwrap_err();
    assert!(matches!(non_member, ChatError::AccessDenied));
    assert!(matches!(missing, ChatError::AccessDenied));
}

#[test]
fn test_send_updates_chat_summary() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();

    let message = send(&messages, &chat, "alice", "hi");

    // Sender is seeded into seen_by
    assert_eq!(message.seen_by.len(), 1);
    assert_eq!(message.seen_by[0].user_id, "alice");

    let chat = chats.get_chat_by_id(&chat.id, "bob").unwrap();
    assert_eq!(chat.message_count, 1);
    let last = chat.last_message.unwrap();
    assert_eq!(last.preview, "hi");
    assert_eq!(last.sender_id, "alice");
    assert_eq!(last.message_id, message.id);

    // B sees exactly one message, seen only by A
    let page = messages.get_chat_messages(&chat.id, "bob", 1, 10).unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].seen_by.len(), 1);
    assert_eq!(page.messages[0].seen_by[0].user_id, "alice");

    assert_eq!(messages.get_unread_message_count("bob").unwrap(), 1);
}

#[test]
fn test_preview_truncates_to_100_chars() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();

    let long = "x".repeat(250);
    send(&messages, &chat, "alice", &long);

    let chat = chats.get_chat_by_id(&chat.id, "alice").unwrap();
    assert_eq!(chat.last_message.unwrap().preview.chars().count(), 100);
}

#[test]
fn test_soft_delete_hides_everywhere_but_audit() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let message = send(&messages, &chat, "alice", "regrettable");

    messages.delete_message(&message.id, "alice").unwrap();

    let page = messages.get_chat_messages(&chat.id, "bob", 1, 10).unwrap();
    assert!(page.messages.is_empty());
    assert_eq!(page.total, 0);

    let found = messages
        .search_messages(&chat.id, "bob", "regrettable", 1, 10)
        .unwrap();
    assert!(found.messages.is_empty());

    assert_eq!(messages.get_unread_message_count("bob").unwrap(), 0);

    // The audit path still reaches the row
    let audit = messages.get_message_by_id(&message.id).unwrap();
    assert!(audit.deleted.is_deleted);
    assert_eq!(audit.deleted.deleted_by.as_deref(), Some("alice"));
    assert_eq!(audit.content, "regrettable");
}

#[test]
fn test_only_sender_can_edit_or_delete() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let message = send(&messages, &chat, "alice", "mine");

    let err = messages.update_message(&message.id, "bob", "hijacked").unwrap_err();
    assert!(matches!(err, ChatError::AccessDenied));

    let err = messages.delete_message(&message.id, "bob").unwrap_err();
    assert!(matches!(err, ChatError::AccessDenied));
}

#[test]
fn test_edit_snapshots_original_exactly_once() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let message = send(&messages, &chat, "alice", "first draft");

    let edited = messages
        .update_message(&message.id, "alice", "second draft")
        .unwrap();
    assert!(edited.edited.is_edited);
    assert_eq!(edited.edited.original_content.as_deref(), Some("first draft"));

    let edited_again = messages
        .update_message(&message.id, "alice", "third draft")
        .unwrap();
    assert_eq!(edited_again.content, "third draft");
    // Still the pre-first-edit content, not the intermediate one
    assert_eq!(
        edited_again.edited.original_content.as_deref(),
        Some("first draft")
    );
}

#[test]
fn test_deleted_message_cannot_be_edited() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let message = send(&messages, &chat, "alice", "gone");

    messages.delete_message(&message.id, "alice").unwrap();
    let err = messages.update_message(&message.id, "alice", "back").unwrap_err();
    assert!(matches!(err, ChatError::InvalidOperation(_)));
}

#[test]
fn test_reaction_toggle() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let message = send(&messages, &chat, "alice", "react to me");

    let reacted = messages.add_reaction(&message.id, "bob", "👍").unwrap();
    assert_eq!(reacted.reactions.len(), 1);

    // Same (user, emoji) again removes it
    let toggled = messages.add_reaction(&message.id, "bob", "👍").unwrap();
    assert!(toggled.reactions.is_empty());

    // Two different emojis from the same user both stick
    messages.add_reaction(&message.id, "bob", "👍").unwrap();
    let two = messages.add_reaction(&message.id, "bob", "🎉").unwrap();
    assert_eq!(two.reactions.len(), 2);
}

#[test]
fn test_mark_as_read_is_idempotent() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let message = send(&messages, &chat, "alice", "read me");

    let read = messages.mark_message_as_read(&message.id, "bob").unwrap();
    assert_eq!(read.seen_by.len(), 2);
    assert_eq!(read.status, ripple_server::models::MessageStatus::Read);

    let again = messages.mark_message_as_read(&message.id, "bob").unwrap();
    assert_eq!(again.seen_by.len(), 2);

    assert_eq!(messages.get_unread_message_count("bob").unwrap(), 0);
}

#[test]
fn test_pagination_is_chronological() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    for i in 1..=5 {
        send(&messages, &chat, "alice", &format!("msg {}", i));
    }

    let page1 = messages.get_chat_messages(&chat.id, "bob", 1, 2).unwrap();
    let contents: Vec<&str> = page1.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["msg 4", "msg 5"]);
    assert!(page1.has_next_page);
    assert!(!page1.has_prev_page);
    assert_eq!(page1.total, 5);

    let page2 = messages.get_chat_messages(&chat.id, "bob", 2, 2).unwrap();
    let contents: Vec<&str> = page2.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["msg 2", "msg 3"]);
    assert!(page2.has_next_page);
    assert!(page2.has_prev_page);

    let page3 = messages.get_chat_messages(&chat.id, "bob", 3, 2).unwrap();
    let contents: Vec<&str> = page3.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["msg 1"]);
    assert!(!page3.has_next_page);
    assert!(page3.has_prev_page);
}

#[test]
fn test_search_messages_newest_first() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    send(&messages, &chat, "alice", "apples are good");
    send(&messages, &chat, "bob", "bananas are better");
    send(&messages, &chat, "alice", "apples forever");

    let found = messages
        .search_messages(&chat.id, "bob", "APPLES", 1, 10)
        .unwrap();
    assert_eq!(found.messages.len(), 2);
    // Newest first, unlike thread pages
    assert_eq!(found.messages[0].content, "apples forever");
    assert_eq!(found.messages[1].content, "apples are good");
}

#[test]
fn test_membership_mutation_requires_privileged_role() {
    let (chats, _) = setup();
    let chat = chats
        .create_chat("alice", group_params("team", &["alice", "bob", "carol"]))
        .unwrap();

    // A plain member probing for admin surface gets the fused error
    let err = chats
        .add_member(&chat.id, "bob", "dave", MemberRole::Member)
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFoundOrForbidden));

    let err = chats
        .update_chat(&chat.id, "bob", UpdateChatParams::default())
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFoundOrForbidden));

    // The admin can
    let updated = chats
        .add_member(&chat.id, "alice", "dave", MemberRole::Member)
        .unwrap();
    assert!(updated.active_member("dave").is_some());
}

#[test]
fn test_adding_active_member_conflicts() {
    let (chats, _) = setup();
    let chat = chats
        .create_chat("alice", group_params("team", &["alice", "bob"]))
        .unwrap();

    let err = chats
        .add_member(&chat.id, "alice", "bob", MemberRole::Member)
        .unwrap_err();
    assert!(matches!(err, ChatError::AlreadyMember));
}

#[test]
fn test_direct_chats_reject_membership_mutation() {
    let (chats, _) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();

    let err = chats
        .add_member(&chat.id, "alice", "carol", MemberRole::Member)
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidOperation(_)));

    let err = chats.remove_member(&chat.id, "alice", "bob").unwrap_err();
    assert!(matches!(err, ChatError::InvalidOperation(_)));
}

#[test]
fn test_member_removal_is_soft() {
    let (chats, _) = setup();
    let chat = chats
        .create_chat("alice", group_params("team", &["alice", "bob"]))
        .unwrap();

    let after = chats.remove_member(&chat.id, "alice", "bob").unwrap();

    // The record survives with is_active = false and a left_at timestamp
    let bob = after.members.iter().find(|m| m.user_id == "bob").unwrap();
    assert!(!bob.is_active);
    assert!(bob.left_at.is_some());

    // And bob no longer passes the membership gate
    let err = chats.get_chat_by_id(&chat.id, "bob").unwrap_err();
    assert!(matches!(err, ChatError::NotFoundOrForbidden));
}

#[test]
fn test_rejoin_reactivates_historical_row() {
    let (chats, _) = setup();
    let chat = chats
        .create_chat("alice", group_params("team", &["alice", "bob"]))
        .unwrap();

    chats.remove_member(&chat.id, "alice", "bob").unwrap();
    let rejoined = chats
        .add_member(&chat.id, "alice", "bob", MemberRole::Member)
        .unwrap();

    let bob = rejoined.active_member("bob").unwrap();
    assert!(bob.left_at.is_none());
    // Still a single row for bob
    assert_eq!(
        rejoined.members.iter().filter(|m| m.user_id == "bob").count(),
        1
    );
}

#[test]
fn test_archived_chats_leave_the_list() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    send(&messages, &chat, "alice", "before archive");

    chats.set_archived(&chat.id, "alice", true).unwrap();

    assert!(chats.get_user_chats("bob").unwrap().is_empty());
    // Unread counting skips archived chats too
    assert_eq!(messages.get_unread_message_count("bob").unwrap(), 0);

    chats.set_archived(&chat.id, "alice", false).unwrap();
    assert_eq!(chats.get_user_chats("bob").unwrap().len(), 1);
    assert_eq!(messages.get_unread_message_count("bob").unwrap(), 1);
}

#[test]
fn test_recreating_archived_direct_chat_revives_it() {
    let (chats, _) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();

    chats.set_archived(&chat.id, "alice", true).unwrap();

    let revived = chats.create_chat("bob", direct_params("bob", "alice")).unwrap();
    assert_eq!(revived.id, chat.id);
    assert!(!revived.archived.is_archived);
}

#[test]
fn test_delete_chat_is_admin_only_and_cascades() {
    let (chats, messages) = setup();
    let chat = chats
        .create_chat("alice", group_params("doomed", &["alice", "bob"]))
        .unwrap();
    let message = send(&messages, &chat, "bob", "soon gone");
    messages.add_reaction(&message.id, "alice", "👍").unwrap();

    let err = chats.delete_chat(&chat.id, "bob").unwrap_err();
    assert!(matches!(err, ChatError::NotFoundOrForbidden));

    chats.delete_chat(&chat.id, "alice").unwrap();

    let err = chats.get_chat_by_id(&chat.id, "alice").unwrap_err();
    assert!(matches!(err, ChatError::NotFoundOrForbidden));
    // Hard delete: even the audit path comes up empty
    let err = messages.get_message_by_id(&message.id).unwrap_err();
    assert!(matches!(err, ChatError::NotFoundOrForbidden));
}

#[test]
fn test_chat_list_sorts_by_recent_activity() {
    let (chats, messages) = setup();
    let first = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let second = chats
        .create_chat("alice", group_params("quiet room", &["alice", "carol"]))
        .unwrap();

    // Activity in the older chat bumps it to the front; the sleep keeps
    // the millisecond timestamps strictly ordered
    std::thread::sleep(std::time::Duration::from_millis(5));
    send(&messages, &chat_handle(&chats, &first.id), "alice", "bump");

    let list = chats.get_user_chats("alice").unwrap();
    assert_eq!(list[0].id, first.id);
    assert_eq!(list[1].id, second.id);
}

fn chat_handle(chats: &ChatService, chat_id: &str) -> Chat {
    chats.get_chat_by_id(chat_id, "alice").unwrap()
}

#[test]
fn test_search_chats_scoped_and_case_insensitive() {
    let (chats, _) = setup();
    chats
        .create_chat("alice", group_params("Rust Lovers", &["alice", "bob"]))
        .unwrap();
    chats
        .create_chat("carol", group_params("Rust Haters", &["carol", "dave"]))
        .unwrap();

    let found = chats.search_chats("alice", "rust").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name.as_deref(), Some("Rust Lovers"));

    // No hits outside the caller's own chats
    assert!(chats.search_chats("alice", "haters").unwrap().is_empty());
}

#[test]
fn test_scenario_delete_clears_thread_and_unread() {
    let (chats, messages) = setup();
    let chat = chats.create_chat("alice", direct_params("alice", "bob")).unwrap();
    let message = send(&messages, &chat, "alice", "hi");

    assert_eq!(messages.get_unread_message_count("bob").unwrap(), 1);

    messages.delete_message(&message.id, "alice").unwrap();

    let page = messages.get_chat_messages(&chat.id, "bob", 1, 10).unwrap();
    assert!(page.messages.is_empty());
    assert_eq!(messages.get_unread_message_count("bob").unwrap(), 0);
}
