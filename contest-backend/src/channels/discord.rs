use crate::contest::traits::{ItemStore, Notifier, PageRequest};
use crate::contest::ContestEvents;
use crate::error::{ContestError, ContestResult};
use crate::models::{
    Attachment, CandidateItem, EmojiKey, PublishedItem, ReactionEvent, ThreadRequest,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::all::{
    AutoArchiveDuration, Channel, ChannelId, Client, Context, CreateMessage, CreateThread,
    EmojiId, EventHandler, GatewayIntents, GetMessages, GuildId, Http, HttpError, Message,
    MessageId, MessageUpdateEvent, Reaction, ReactionType, Ready, UserId,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Recently seen items kept for edit comparison
const RECENT_CAPACITY: usize = 5000;

/// Discord caps thread names at 100 characters
const THREAD_NAME_LIMIT: usize = 100;

/// Parse a snowflake id; Discord ids are never zero
fn snowflake(kind: &str, id: &str) -> ContestResult<u64> {
    id.parse::<u64>()
        .ok()
        .filter(|v| *v != 0)
        .ok_or_else(|| ContestError::NotFound(format!("invalid {} id '{}'", kind, id)))
}

fn channel_id(id: &str) -> ContestResult<ChannelId> {
    snowflake("channel", id).map(ChannelId::new)
}

fn message_id(id: &str) -> ContestResult<MessageId> {
    snowflake("message", id).map(MessageId::new)
}

fn is_not_found(e: &serenity::Error) -> bool {
    matches!(
        e,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 404
    )
}

fn emoji_key(reaction: &ReactionType) -> EmojiKey {
    match reaction {
        ReactionType::Custom { id, name, .. } => EmojiKey::Custom {
            id: id.to_string(),
            name: name.clone(),
        },
        ReactionType::Unicode(s) => EmojiKey::Unicode(s.clone()),
        other => EmojiKey::Unicode(other.to_string()),
    }
}

fn reaction_type(emoji: &EmojiKey) -> ContestResult<ReactionType> {
    Ok(match emoji {
        EmojiKey::Unicode(s) => ReactionType::Unicode(s.clone()),
        EmojiKey::Custom { id, name } => ReactionType::Custom {
            animated: false,
            id: EmojiId::new(snowflake("emoji", id)?),
            name: name.clone(),
        },
    })
}

/// Closest archive duration Discord accepts, in minutes
fn archive_duration(minutes: u16) -> Option<AutoArchiveDuration> {
    match minutes {
        60 => Some(AutoArchiveDuration::OneHour),
        1440 => Some(AutoArchiveDuration::OneDay),
        4320 => Some(AutoArchiveDuration::ThreeDays),
        10080 => Some(AutoArchiveDuration::OneWeek),
        _ => None,
    }
}

fn thread_name(name: &str) -> String {
    name.chars().take(THREAD_NAME_LIMIT).collect()
}

/// Discord messages as contest items, over the REST client
pub struct DiscordItemStore {
    http: Arc<Http>,
    /// Channel -> owning guild, `None` for private channels
    guilds: DashMap<ChannelId, Option<GuildId>>,
    recent: DashMap<String, CandidateItem>,
}

impl DiscordItemStore {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            guilds: DashMap::new(),
            recent: DashMap::new(),
        }
    }

    /// Messages fetched over REST carry no guild id; resolve it from the channel
    async fn guild_of(&self, channel: ChannelId) -> Option<GuildId> {
        if let Some(known) = self.guilds.get(&channel) {
            return *known;
        }

        match channel.to_channel(&*self.http).await {
            Ok(Channel::Guild(gc)) => {
                self.guilds.insert(channel, Some(gc.guild_id));
                Some(gc.guild_id)
            }
            Ok(_) => {
                self.guilds.insert(channel, None);
                None
            }
            Err(e) => {
                log::debug!("[discord] Failed to resolve channel {}: {}", channel, e);
                None
            }
        }
    }

    pub async fn to_candidate(&self, msg: &Message) -> CandidateItem {
        let guild_id = match msg.guild_id {
            Some(guild_id) => Some(guild_id),
            None => self.guild_of(msg.channel_id).await,
        };
        let created_at = DateTime::<Utc>::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now);
        let permalink = format!(
            "https://discord.com/channels/{}/{}/{}",
            guild_id.map_or_else(|| "@me".to_string(), |g| g.to_string()),
            msg.channel_id,
            msg.id
        );

        CandidateItem {
            id: msg.id.to_string(),
            author_id: msg.author.id.to_string(),
            author_name: msg.author.name.clone(),
            author_mention: format!("<@{}>", msg.author.id),
            author_is_bot: msg.author.bot,
            channel_id: msg.channel_id.to_string(),
            group_id: guild_id.map(|g| g.to_string()),
            created_at,
            reactions: msg
                .reactions
                .iter()
                .map(|r| (emoji_key(&r.reaction_type).key().to_string(), r.count))
                .collect(),
            attachments: msg
                .attachments
                .iter()
                .map(|a| Attachment {
                    url: a.url.clone(),
                    filename: a.filename.clone(),
                    content_type: a.content_type.clone(),
                })
                .collect(),
            content: msg.content.clone(),
            permalink,
        }
    }
}

#[async_trait]
impl ItemStore for DiscordItemStore {
    async fn fetch_item(
        &self,
        channel: &str,
        item_id: &str,
    ) -> ContestResult<Option<CandidateItem>> {
        let channel = channel_id(channel)?;
        match channel.message(&*self.http, message_id(item_id)?).await {
            Ok(msg) => Ok(Some(self.to_candidate(&msg).await)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(ContestError::transient(e)),
        }
    }

    async fn fetch_page(
        &self,
        channel: &str,
        request: PageRequest<'_>,
    ) -> ContestResult<Vec<CandidateItem>> {
        let channel = channel_id(channel)?;
        let mut builder = GetMessages::new().limit(request.limit);
        if let Some(before) = request.before {
            builder = builder.before(message_id(before)?);
        }

        let messages = channel
            .messages(&*self.http, builder)
            .await
            .map_err(ContestError::transient)?;

        let mut items = Vec::with_capacity(messages.len());
        for msg in &messages {
            let item = self.to_candidate(msg).await;
            if request.populate_cache {
                self.remember_item(&item);
            }
            items.push(item);
        }
        Ok(items)
    }

    async fn publish(&self, channel: &str, content: &str) -> ContestResult<PublishedItem> {
        let msg = channel_id(channel)?
            .send_message(&*self.http, CreateMessage::new().content(content))
            .await
            .map_err(ContestError::transient)?;
        Ok(PublishedItem {
            id: msg.id.to_string(),
            channel_id: msg.channel_id.to_string(),
        })
    }

    async fn open_thread(
        &self,
        channel: &str,
        parent_item_id: &str,
        request: &ThreadRequest,
    ) -> ContestResult<()> {
        let mut builder = CreateThread::new(thread_name(&request.name));
        if let Some(minutes) = request.auto_archive_minutes {
            match archive_duration(minutes) {
                Some(duration) => builder = builder.auto_archive_duration(duration),
                None => log::debug!(
                    "[discord] Unsupported archive duration {}m, using default",
                    minutes
                ),
            }
        }
        if let Some(seconds) = request.rate_limit_per_user {
            builder = builder.rate_limit_per_user(seconds);
        }
        if let Some(reason) = &request.reason {
            builder = builder.audit_log_reason(reason);
        }

        channel_id(channel)?
            .create_thread_from_message(&*self.http, message_id(parent_item_id)?, builder)
            .await
            .map_err(ContestError::transient)?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: &str,
        item_id: &str,
        emoji: &EmojiKey,
    ) -> ContestResult<()> {
        channel_id(channel)?
            .create_reaction(&self.http, message_id(item_id)?, reaction_type(emoji)?)
            .await
            .map_err(ContestError::transient)
    }

    async fn remove_reaction(
        &self,
        channel: &str,
        item_id: &str,
        emoji: &EmojiKey,
        user_id: &str,
    ) -> ContestResult<()> {
        let user = UserId::new(snowflake("user", user_id)?);
        channel_id(channel)?
            .delete_reaction(&self.http, message_id(item_id)?, Some(user), reaction_type(emoji)?)
            .await
            .map_err(ContestError::transient)
    }

    async fn delete_item(&self, channel: &str, item_id: &str) -> ContestResult<()> {
        let id = message_id(item_id)?;
        self.recent.remove(item_id);
        match channel_id(channel)?.delete_message(&self.http, id).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                Err(ContestError::NotFound(format!("message {}", item_id)))
            }
            Err(e) => Err(ContestError::transient(e)),
        }
    }

    async fn channel_name(&self, channel: &str) -> ContestResult<Option<String>> {
        match channel_id(channel)?.to_channel(&*self.http).await {
            Ok(Channel::Guild(gc)) => Ok(Some(gc.name)),
            Ok(_) => Ok(None),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(ContestError::transient(e)),
        }
    }

    fn cached_item(&self, item_id: &str) -> Option<CandidateItem> {
        self.recent.get(item_id).map(|entry| entry.value().clone())
    }

    fn remember_item(&self, item: &CandidateItem) {
        if self.recent.len() >= RECENT_CAPACITY && !self.recent.contains_key(&item.id) {
            // Evict the oldest item
            let oldest = self
                .recent
                .iter()
                .min_by_key(|entry| entry.value().created_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.recent.remove(&oldest);
            }
        }
        self.recent.insert(item.id.clone(), item.clone());
    }
}

#[async_trait]
impl Notifier for DiscordItemStore {
    async fn notify(&self, user_id: &str, content: &str) -> ContestResult<()> {
        UserId::new(snowflake("user", user_id)?)
            .direct_message(&*self.http, CreateMessage::new().content(content))
            .await
            .map_err(ContestError::transient)?;
        Ok(())
    }
}

/// Gateway events into the contest event bus
pub struct ContestHandler {
    events: Arc<ContestEvents>,
    store: Arc<DiscordItemStore>,
}

impl ContestHandler {
    pub fn new(events: Arc<ContestEvents>, store: Arc<DiscordItemStore>) -> Self {
        Self { events, store }
    }

    /// Reaction as an engine event; `None` for channels no module watches,
    /// which never cost a guild lookup
    async fn reaction_event(
        &self,
        channel: ChannelId,
        guild_id: Option<GuildId>,
        message: MessageId,
        user: Option<UserId>,
        emoji: &ReactionType,
    ) -> Option<ReactionEvent> {
        if !self.events.watches(&channel.to_string()) {
            return None;
        }

        let guild_id = match guild_id {
            Some(guild_id) => Some(guild_id),
            None => self.store.guild_of(channel).await,
        };
        Some(ReactionEvent {
            channel_id: channel.to_string(),
            item_id: message.to_string(),
            group_id: guild_id.map(|g| g.to_string()),
            user_id: user.map(|u| u.to_string()),
            emoji: emoji_key(emoji),
        })
    }
}

#[serenity::async_trait]
impl EventHandler for ContestHandler {
    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot || !self.events.watches(&msg.channel_id.to_string()) {
            return;
        }

        let item = self.store.to_candidate(&msg).await;
        if let Err(e) = self.events.on_item_created(&item, Utc::now()).await {
            log::warn!("Discord: Failed to handle message {}: {}", msg.id, e);
        }
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        self.store.recent.remove(&deleted_message_id.to_string());
        if let Err(e) = self
            .events
            .on_item_deleted(&channel_id.to_string(), &deleted_message_id.to_string())
            .await
        {
            log::warn!("Discord: Failed to handle deletion of {}: {}", deleted_message_id, e);
        }
    }

    async fn message_update(
        &self,
        ctx: Context,
        old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if !self.events.watches(&event.channel_id.to_string()) {
            return;
        }

        let new = match new {
            Some(msg) => msg,
            None => match event.channel_id.message(&ctx, event.id).await {
                Ok(msg) => msg,
                Err(e) => {
                    log::debug!("Discord: Unresolved edited message {}: {}", event.id, e);
                    return;
                }
            },
        };

        let old = match &old_if_available {
            Some(msg) => Some(self.store.to_candidate(msg).await),
            None => None,
        };
        let new = self.store.to_candidate(&new).await;
        if let Err(e) = self.events.on_item_edited(old.as_ref(), &new).await {
            log::warn!("Discord: Failed to handle edit of {}: {}", new.id, e);
        }
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        let Some(event) = self
            .reaction_event(
                reaction.channel_id,
                reaction.guild_id,
                reaction.message_id,
                reaction.user_id,
                &reaction.emoji,
            )
            .await
        else {
            return;
        };
        if let Err(e) = self.events.on_reaction_added(&event).await {
            log::warn!("Discord: Failed to handle reaction on {}: {}", reaction.message_id, e);
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        log::info!("Discord: Bot connected as {}", ready.user.name);
    }
}

/// Run the gateway client until it fails or `shutdown` is cancelled
pub async fn start_discord_listener(
    token: &str,
    handler: ContestHandler,
    shutdown: CancellationToken,
) -> Result<(), String> {
    log::info!("Starting Discord listener");

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| format!("Failed to create Discord client: {}", e))?;

    log::info!("Discord: Client created successfully");
    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        _ = shutdown.cancelled() => {
            log::info!("Discord listener received shutdown signal");
            shard_manager.shutdown_all().await;
        }
        result = client.start() => {
            match result {
                Ok(()) => log::info!("Discord listener stopped"),
                Err(e) => {
                    let error = format!("Discord client error: {}", e);
                    log::error!("{}", error);
                    return Err(error);
                }
            }
        }
    }

    Ok(())
}
