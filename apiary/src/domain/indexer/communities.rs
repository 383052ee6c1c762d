//! Community registration, membership, and moderation actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::community::{
    community_type_id, Community, CommunityProps, CommunityRole, Role, Subscription,
};
use crate::domain::error::OpError;
use crate::domain::notification::NotifyKind;
use crate::domain::ops::CommunityAction;
use crate::domain::ports::{AccountStore, CommunityStore, IndexStore, PostStore, StoreError};

use super::notify::{NotificationWriter, NotifyRefs};

/// Indexes community accounts and `community`-id custom-json actions.
pub struct CommunityIndexer<S> {
    store: Arc<S>,
    notify: NotificationWriter<S>,
}

impl<S: IndexStore> CommunityIndexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        let notify = NotificationWriter::new(Arc::clone(&store));
        Self { store, notify }
    }

    /// Promote freshly registered accounts whose names match the community
    /// pattern: create the community row (sharing the account id), grant the
    /// account the owner role, and announce it.
    pub async fn register_new_accounts(
        &self,
        tx: &mut S::Tx,
        names: &[String],
        block_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for name in names {
            let Some(type_id) = community_type_id(name) else {
                continue;
            };
            let Some(account) = self.store.account_by_name(tx, name).await? else {
                continue;
            };
            if self.store.community_by_id(tx, account.id).await?.is_some() {
                continue;
            }

            self.store
                .create_community(
                    tx,
                    &Community::registered(account.id, name.clone(), type_id, block_date),
                )
                .await?;
            self.store
                .upsert_role(
                    tx,
                    &Role {
                        community_id: account.id,
                        account_id: account.id,
                        role: CommunityRole::Owner,
                        title: None,
                        created_at: block_date,
                    },
                )
                .await?;

            if let Err(error) = self
                .notify
                .write(
                    tx,
                    NotifyKind::NewCommunity,
                    block_date,
                    NotifyRefs {
                        dst: Some(account.id),
                        community: Some(account.id),
                        src: None,
                        post: None,
                    },
                    None,
                    None,
                )
                .await
            {
                if error.is_fatal() {
                    let OpError::Store(store_error) = error else {
                        unreachable!("fatal op errors are store errors");
                    };
                    return Err(store_error);
                }
            }

            info!(name = %name, id = account.id, type_id, "registered community");
        }
        Ok(())
    }

    /// Apply one community action on behalf of `actor`.
    pub async fn process_action(
        &self,
        tx: &mut S::Tx,
        actor: &str,
        action: &CommunityAction,
        block_date: DateTime<Utc>,
    ) -> Result<(), OpError> {
        let community = self
            .store
            .community_by_name(tx, action.community())
            .await?
            .ok_or_else(|| OpError::UnknownCommunity(action.community().to_owned()))?;
        let actor_account = self
            .store
            .account_by_name(tx, actor)
            .await?
            .ok_or_else(|| OpError::UnknownAccount(actor.to_owned()))?;
        let actor_id = actor_account.id;
        let community_id = community.id;

        match action {
            CommunityAction::Subscribe { .. } => {
                let created = self
                    .store
                    .create_subscription(
                        tx,
                        &Subscription {
                            community_id,
                            account_id: actor_id,
                            created_at: block_date,
                        },
                    )
                    .await?;
                if created {
                    self.store.adjust_subscribers(tx, community_id, 1).await?;
                    self.write_notify(
                        tx,
                        NotifyKind::Subscribe,
                        block_date,
                        NotifyRefs {
                            src: Some(actor_id),
                            community: Some(community_id),
                            dst: None,
                            post: None,
                        },
                        None,
                    )
                    .await?;
                }
            }
            CommunityAction::Unsubscribe { .. } => {
                let removed = self
                    .store
                    .delete_subscription(tx, community_id, actor_id)
                    .await?;
                if removed {
                    self.store.adjust_subscribers(tx, community_id, -1).await?;
                }
            }
            CommunityAction::SetRole { account, role, .. } => {
                let target = self.lookup_account(tx, account).await?;
                let role = CommunityRole::from_name(role);
                self.store
                    .upsert_role(
                        tx,
                        &Role {
                            community_id,
                            account_id: target,
                            role,
                            title: None,
                            created_at: block_date,
                        },
                    )
                    .await?;
                self.write_notify(
                    tx,
                    NotifyKind::SetRole,
                    block_date,
                    NotifyRefs {
                        src: Some(actor_id).filter(|id| *id != target),
                        dst: Some(target),
                        community: Some(community_id),
                        post: None,
                    },
                    Some(role.as_name().to_owned()),
                )
                .await?;
            }
            CommunityAction::SetUserTitle { account, title, .. } => {
                let target = self.lookup_account(tx, account).await?;
                self.store
                    .set_role_title(tx, community_id, target, title)
                    .await?;
                self.write_notify(
                    tx,
                    NotifyKind::SetLabel,
                    block_date,
                    NotifyRefs {
                        src: Some(actor_id).filter(|id| *id != target),
                        dst: Some(target),
                        community: Some(community_id),
                        post: None,
                    },
                    Some(title.clone()),
                )
                .await?;
            }
            CommunityAction::UpdateProps { props, .. } => {
                let parsed = CommunityProps::from_map(props);
                if !parsed.is_empty() {
                    self.store
                        .update_community_props(tx, community_id, &parsed)
                        .await?;
                }
                let payload = serde_json::Value::Object(props.clone()).to_string();
                self.write_notify(
                    tx,
                    NotifyKind::SetProps,
                    block_date,
                    NotifyRefs {
                        src: Some(actor_id),
                        community: Some(community_id),
                        dst: None,
                        post: None,
                    },
                    Some(payload),
                )
                .await?;
            }
            CommunityAction::MutePost {
                account, permlink, notes, ..
            } => {
                let post_id = self.lookup_post(tx, account, permlink).await?;
                self.store.set_post_muted(tx, post_id, true).await?;
                self.notify_post_action(
                    tx,
                    NotifyKind::MutePost,
                    block_date,
                    actor_id,
                    community_id,
                    post_id,
                    notes.clone(),
                )
                .await?;
            }
            CommunityAction::UnmutePost {
                account, permlink, notes, ..
            } => {
                let post_id = self.lookup_post(tx, account, permlink).await?;
                self.store.set_post_muted(tx, post_id, false).await?;
                self.notify_post_action(
                    tx,
                    NotifyKind::UnmutePost,
                    block_date,
                    actor_id,
                    community_id,
                    post_id,
                    notes.clone(),
                )
                .await?;
            }
            CommunityAction::PinPost {
                account, permlink, notes, ..
            } => {
                let post_id = self.lookup_post(tx, account, permlink).await?;
                self.store.set_post_pinned(tx, post_id, true).await?;
                self.notify_post_action(
                    tx,
                    NotifyKind::PinPost,
                    block_date,
                    actor_id,
                    community_id,
                    post_id,
                    notes.clone(),
                )
                .await?;
            }
            CommunityAction::UnpinPost {
                account, permlink, notes, ..
            } => {
                let post_id = self.lookup_post(tx, account, permlink).await?;
                self.store.set_post_pinned(tx, post_id, false).await?;
                self.notify_post_action(
                    tx,
                    NotifyKind::UnpinPost,
                    block_date,
                    actor_id,
                    community_id,
                    post_id,
                    notes.clone(),
                )
                .await?;
            }
            CommunityAction::FlagPost {
                account, permlink, notes, ..
            } => {
                // Flags only surface to moderators; the post row itself is
                // left untouched.
                let post_id = self.lookup_post(tx, account, permlink).await?;
                self.notify_post_action(
                    tx,
                    NotifyKind::FlagPost,
                    block_date,
                    actor_id,
                    community_id,
                    post_id,
                    notes.clone(),
                )
                .await?;
            }
        }

        debug!(actor = %actor, community = %action.community(), "processed community action");
        Ok(())
    }

    async fn lookup_account(&self, tx: &mut S::Tx, name: &str) -> Result<i64, OpError> {
        self.store
            .account_by_name(tx, name)
            .await?
            .map(|account| account.id)
            .ok_or_else(|| OpError::UnknownAccount(name.to_owned()))
    }

    async fn lookup_post(
        &self,
        tx: &mut S::Tx,
        author: &str,
        permlink: &str,
    ) -> Result<i64, OpError> {
        self.store
            .post_by_author_permlink(tx, author, permlink)
            .await?
            .map(|post| post.id)
            .ok_or_else(|| OpError::UnknownPost {
                author: author.to_owned(),
                permlink: permlink.to_owned(),
            })
    }

    async fn notify_post_action(
        &self,
        tx: &mut S::Tx,
        kind: NotifyKind,
        when: DateTime<Utc>,
        actor_id: i64,
        community_id: i64,
        post_id: i64,
        notes: Option<String>,
    ) -> Result<(), OpError> {
        self.write_notify(
            tx,
            kind,
            when,
            NotifyRefs {
                src: Some(actor_id),
                community: Some(community_id),
                post: Some(post_id),
                dst: None,
            },
            notes.filter(|notes| !notes.is_empty()),
        )
        .await
    }

    async fn write_notify(
        &self,
        tx: &mut S::Tx,
        kind: NotifyKind,
        when: DateTime<Utc>,
        refs: NotifyRefs,
        payload: Option<String>,
    ) -> Result<(), OpError> {
        self.notify.write(tx, kind, when, refs, payload, None).await?;
        Ok(())
    }
}
