//! Tests for hub routing, presence and fan-out

#[cfg(test)]
mod tests {
    use crate::codec::{encode, EncodedGraph};
    use crate::config::{DeclinePolicy, SyncConfig, UndeliveredPolicy};
    use crate::models::{create_member, FamilyGraph, MemberDraft, MemberId, UserLink};
    use crate::sync::directory::{InMemoryAccountDirectory, InMemoryFamilyIndex};
    use crate::sync::hub::{SessionId, SyncHub};
    use crate::sync::protocol::*;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn hub_with(config: SyncConfig) -> SyncHub {
        SyncHub::new(
            Arc::new(InMemoryAccountDirectory::new()),
            Arc::new(InMemoryFamilyIndex::new()),
            config,
        )
    }

    fn hub() -> SyncHub {
        hub_with(SyncConfig::default())
    }

    fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    /// Open a session and announce `email` on it, discarding presence chatter
    async fn online(
        hub: &SyncHub,
        email: &str,
    ) -> (SessionId, UnboundedReceiver<ServerMessage>) {
        let (id, mut rx) = hub.open_session().await;
        hub.handle(
            id,
            ClientMessage::UserOnline {
                email: email.to_string(),
            },
        )
        .await;
        drain(&mut rx);
        (id, rx)
    }

    async fn register(hub: &SyncHub, email: &str) -> MemberId {
        hub.signup(SignupRequest {
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap()
        .member_id
    }

    fn family_rooted_at(member_id: &MemberId, email: &str) -> EncodedGraph {
        let mut root = create_member(MemberDraft::named("Root").user(UserLink::new(email)));
        root.id = member_id.clone();
        encode(&FamilyGraph::with_root(root))
    }

    #[tokio::test]
    async fn test_unassociated_member_status() {
        let hub = hub();
        let (id, mut rx) = hub.open_session().await;

        hub.handle(
            id,
            ClientMessage::HandleConnection {
                member_id: MemberId::from("m-1"),
            },
        )
        .await;

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::MemberStatus {
                is_associated: false,
                received_mem_id: MemberId::from("m-1"),
            }]
        );
        assert_eq!(hub.session_member(id).await, Some(MemberId::from("m-1")));
    }

    #[tokio::test]
    async fn test_created_family_is_served_as_initial_data() {
        let hub = hub();
        let member_id = register(&hub, "a@x.org").await;
        let (id, mut rx) = online(&hub, "a@x.org").await;
        let graph = family_rooted_at(&member_id, "a@x.org");

        hub.handle(id, ClientMessage::CreateFamily { family_data: graph.clone() })
            .await;
        hub.handle(id, ClientMessage::HandleConnection { member_id: member_id.clone() })
            .await;
        hub.handle(id, ClientMessage::InitialDataRequest { member_id: member_id.clone() })
            .await;

        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMessage::MemberStatus {
                    is_associated: true,
                    received_mem_id: member_id,
                },
                ServerMessage::InitialData {
                    family_data: Some(graph),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_initial_data_for_unknown_member_is_null() {
        let hub = hub();
        let (id, mut rx) = hub.open_session().await;

        hub.handle(id, ClientMessage::InitialDataRequest { member_id: MemberId::from("nobody") })
            .await;

        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::InitialData { family_data: None }]
        );
    }

    #[tokio::test]
    async fn test_creating_a_family_twice_conflicts() {
        let hub = hub();
        let member_id = register(&hub, "a@x.org").await;
        let (id, mut rx) = online(&hub, "a@x.org").await;
        let graph = family_rooted_at(&member_id, "a@x.org");

        hub.handle(id, ClientMessage::CreateFamily { family_data: graph.clone() })
            .await;
        hub.handle(id, ClientMessage::CreateFamily { family_data: graph })
            .await;

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], ServerMessage::Error { code, .. } if code == "CONFLICT"));
    }

    #[tokio::test]
    async fn test_join_request_reaches_target() {
        let hub = hub();
        register(&hub, "a@x.org").await;
        let (_a, mut a_rx) = online(&hub, "a@x.org").await;
        let (b, mut b_rx) = online(&hub, "b@x.org").await;
        drain(&mut a_rx);

        hub.handle(
            b,
            ClientMessage::RequestToJoin {
                requester_email: "b@x.org".to_string(),
                target_email: "A@x.org".to_string(),
            },
        )
        .await;

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::JoinRequest {
                from: "b@x.org".to_string()
            }]
        );
        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_join_request_for_unknown_account_is_not_found() {
        let hub = hub();
        let (b, mut b_rx) = online(&hub, "b@x.org").await;

        hub.handle(
            b,
            ClientMessage::RequestToJoin {
                requester_email: "b@x.org".to_string(),
                target_email: "ghost@x.org".to_string(),
            },
        )
        .await;

        let messages = drain(&mut b_rx);
        assert!(matches!(
            &messages[..],
            [ServerMessage::Error { code, .. }] if code == "NOT_FOUND"
        ));
    }

    #[tokio::test]
    async fn test_offline_target_is_dropped_by_default() {
        let hub = hub();
        register(&hub, "a@x.org").await;
        let (b, mut b_rx) = online(&hub, "b@x.org").await;

        hub.handle(
            b,
            ClientMessage::RequestToJoin {
                requester_email: "b@x.org".to_string(),
                target_email: "a@x.org".to_string(),
            },
        )
        .await;

        assert!(drain(&mut b_rx).is_empty());
    }

    #[tokio::test]
    async fn test_offline_target_is_reported_under_report_policy() {
        let hub = hub_with(SyncConfig {
            undelivered_policy: UndeliveredPolicy::Report,
            ..SyncConfig::default()
        });
        register(&hub, "a@x.org").await;
        let (b, mut b_rx) = online(&hub, "b@x.org").await;

        hub.handle(
            b,
            ClientMessage::RequestToJoin {
                requester_email: "b@x.org".to_string(),
                target_email: "a@x.org".to_string(),
            },
        )
        .await;

        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::DeliveryFailed {
                recipient: "a@x.org".to_string(),
                failed_event: "joinRequest".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_family_update_fans_out_to_recipients_only() {
        let hub = hub();
        let member_id = register(&hub, "a@x.org").await;
        let (a, mut a_rx) = online(&hub, "a@x.org").await;
        let (_b, mut b_rx) = online(&hub, "b@x.org").await;
        let (_c, mut c_rx) = online(&hub, "c@x.org").await;
        let (_d, mut d_rx) = online(&hub, "d@x.org").await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);
        let update = FamilyUpdate {
            from: "a@x.org".to_string(),
            recipients: vec!["b@x.org".to_string(), "c@x.org".to_string()],
            family_data: family_rooted_at(&member_id, "a@x.org"),
            change_type: ChangeType::AddMember,
        };

        hub.handle(a, ClientMessage::FamilyUpdate(update.clone())).await;

        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(drain(&mut b_rx), vec![ServerMessage::FamilyUpdate(update.clone())]);
        assert_eq!(drain(&mut c_rx), vec![ServerMessage::FamilyUpdate(update)]);
        assert!(drain(&mut d_rx).is_empty());
    }

    #[tokio::test]
    async fn test_family_update_never_echoes_to_sender() {
        let hub = hub();
        let member_id = register(&hub, "a@x.org").await;
        let (a, mut a_rx) = online(&hub, "a@x.org").await;
        let update = FamilyUpdate {
            from: "a@x.org".to_string(),
            recipients: vec!["a@x.org".to_string()],
            family_data: family_rooted_at(&member_id, "a@x.org"),
            change_type: ChangeType::AddMember,
        };

        hub.handle(a, ClientMessage::FamilyUpdate(update)).await;

        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_family_update_associates_members() {
        let hub = hub();
        let member_id = register(&hub, "a@x.org").await;
        let (a, mut a_rx) = online(&hub, "a@x.org").await;

        hub.handle(
            a,
            ClientMessage::FamilyUpdate(FamilyUpdate {
                from: "a@x.org".to_string(),
                recipients: Vec::new(),
                family_data: family_rooted_at(&member_id, "a@x.org"),
                change_type: ChangeType::JoinFamily,
            }),
        )
        .await;
        hub.handle(a, ClientMessage::HandleConnection { member_id: member_id.clone() })
            .await;

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::MemberStatus {
                is_associated: true,
                received_mem_id: member_id,
            }]
        );
    }

    #[tokio::test]
    async fn test_presence_broadcasts() {
        let hub = hub();
        let (a, mut a_rx) = online(&hub, "a@x.org").await;
        let (b, mut b_rx) = hub.open_session().await;

        hub.handle(b, ClientMessage::UserOnline { email: "b@x.org".to_string() })
            .await;
        hub.handle(b, ClientMessage::AskForOnlineUsers).await;

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::UserStatusChange {
                email: "b@x.org".to_string(),
                status: PresenceStatus::Online,
            }]
        );
        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::OnlineUsersList {
                users: vec!["a@x.org".to_string(), "b@x.org".to_string()],
            }]
        );

        hub.close_session(b).await;

        assert_eq!(
            drain(&mut a_rx),
            vec![ServerMessage::UserStatusChange {
                email: "b@x.org".to_string(),
                status: PresenceStatus::Offline,
            }]
        );
        assert_eq!(hub.online_accounts().await, vec!["a@x.org"]);
        assert_eq!(hub.session_count().await, 1);
        hub.close_session(a).await;
        assert_eq!(hub.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_messages_must_come_from_the_bound_account() {
        let hub = hub_with(SyncConfig {
            decline_policy: DeclinePolicy::Notify,
            ..SyncConfig::default()
        });
        let member_id = register(&hub, "a@x.org").await;
        let (_a, mut a_rx) = online(&hub, "a@x.org").await;
        let (b, mut b_rx) = online(&hub, "b@x.org").await;
        let (anonymous, mut anonymous_rx) = hub.open_session().await;
        drain(&mut a_rx);

        let spoofed = [
            ClientMessage::RequestToJoin {
                requester_email: "c@x.org".to_string(),
                target_email: "a@x.org".to_string(),
            },
            ClientMessage::ShareFamilyData {
                from: "a@x.org".to_string(),
                target: "a@x.org".to_string(),
                family_data: family_rooted_at(&member_id, "a@x.org"),
            },
            ClientMessage::DeclineJoin {
                from: "c@x.org".to_string(),
                target: "a@x.org".to_string(),
            },
        ];
        for message in spoofed {
            hub.handle(b, message).await;
        }

        let errors = drain(&mut b_rx);
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .all(|m| matches!(m, ServerMessage::Error { code, .. } if code == "PROTOCOL_ERROR")));
        assert!(drain(&mut a_rx).is_empty());

        // A session that never announced an account cannot send on anyone's behalf
        hub.handle(
            anonymous,
            ClientMessage::RequestToJoin {
                requester_email: "b@x.org".to_string(),
                target_email: "a@x.org".to_string(),
            },
        )
        .await;
        assert!(matches!(
            &drain(&mut anonymous_rx)[..],
            [ServerMessage::Error { code, .. }] if code == "PROTOCOL_ERROR"
        ));
        assert!(drain(&mut a_rx).is_empty());
    }

    #[tokio::test]
    async fn test_share_family_data_reaches_requester() {
        let hub = hub();
        let member_id = register(&hub, "a@x.org").await;
        let (a, _a_rx) = online(&hub, "a@x.org").await;
        let (_b, mut b_rx) = online(&hub, "b@x.org").await;
        let graph = family_rooted_at(&member_id, "a@x.org");

        hub.handle(
            a,
            ClientMessage::ShareFamilyData {
                from: "a@x.org".to_string(),
                target: "b@x.org".to_string(),
                family_data: graph.clone(),
            },
        )
        .await;

        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::ReceiveFamilyData {
                from: "a@x.org".to_string(),
                family_data: graph,
            }]
        );
    }

    #[tokio::test]
    async fn test_decline_relay_follows_policy() {
        let decline = ClientMessage::DeclineJoin {
            from: "a@x.org".to_string(),
            target: "b@x.org".to_string(),
        };

        let silent = hub();
        let (a, _a_rx) = online(&silent, "a@x.org").await;
        let (_b, mut b_rx) = online(&silent, "b@x.org").await;
        silent.handle(a, decline.clone()).await;
        assert!(drain(&mut b_rx).is_empty());

        let notify = hub_with(SyncConfig {
            decline_policy: DeclinePolicy::Notify,
            ..SyncConfig::default()
        });
        let (a, _a_rx) = online(&notify, "a@x.org").await;
        let (_b, mut b_rx) = online(&notify, "b@x.org").await;
        notify.handle(a, decline).await;
        assert_eq!(
            drain(&mut b_rx),
            vec![ServerMessage::JoinDeclined {
                by: "a@x.org".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_signup_and_login() {
        let hub = hub();
        let member_id = register(&hub, "a@x.org").await;

        let response = hub
            .login(LoginRequest {
                email: "a@x.org".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.member_id, member_id);
        assert!(hub
            .login(LoginRequest {
                email: "a@x.org".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .is_err());
    }
}
