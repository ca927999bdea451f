use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use carmart_api::{CommentEvent, FeedMessage, ListingId, Uuid};
use futures::{channel::mpsc, select, SinkExt, StreamExt};
use tokio::sync::RwLock;

/// Websockets watching the comments of each listing
#[derive(Clone, Debug, Default)]
pub struct CommentFeeds(
    Arc<RwLock<HashMap<ListingId, HashMap<Uuid, mpsc::UnboundedSender<FeedMessage>>>>>,
);

impl CommentFeeds {
    pub fn new() -> CommentFeeds {
        CommentFeeds(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn num_watchers(&self, listing: ListingId) -> usize {
        self.0.read().await.get(&listing).map_or(0, |s| s.len())
    }

    pub async fn add_for_listing<W, R>(self, listing: ListingId, mut write: W, read: R)
    where
        W: 'static + Send + Unpin + futures::Sink<Message>,
        <W as futures::Sink<Message>>::Error: Send,
        R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
    {
        // Unbounded, as a bounded channel would deadlock between the write-lock
        // removing a socket and the read-lock relaying an event
        let (sender, mut receiver) = mpsc::unbounded();
        let sender_id = Uuid::new_v4();

        self.0
            .write()
            .await
            .entry(listing)
            .or_insert_with(HashMap::new)
            .insert(sender_id, sender);

        let this = self.clone();
        let mut read = read.fuse();
        tokio::spawn(async move {
            macro_rules! remove_self {
                () => {{
                    let mut feeds = this.0.write().await;
                    if let Some(socks) = feeds.get_mut(&listing) {
                        socks.remove(&sender_id);
                        if socks.is_empty() {
                            feeds.remove(&listing);
                        }
                    }
                    tracing::debug!(?listing, "comment feed websocket closed");
                    return;
                }};
            }
            macro_rules! send_message {
                ( $msg:expr ) => {{
                    let msg: FeedMessage = $msg;
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::error!(?err, ?msg, "failed serializing message to json");
                            continue;
                        }
                    };
                    if let Err(_) = write.send(Message::Text(json)).await {
                        remove_self!();
                    }
                }};
            }
            loop {
                select! {
                    msg = receiver.next() => match msg {
                        None => remove_self!(),
                        Some(msg) => send_message!(msg),
                    },
                    msg = read.next() => match msg {
                        None => remove_self!(),
                        Some(Ok(Message::Close(_))) => remove_self!(),
                        Some(Ok(Message::Text(msg))) => {
                            if msg != "ping" {
                                tracing::warn!("received unexpected message from client: {msg:?}");
                                remove_self!();
                            }
                            send_message!(FeedMessage::Pong);
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => (),
                        Some(msg) => {
                            tracing::warn!("received unexpected message from client: {msg:?}");
                            remove_self!();
                        }
                    },
                }
            }
        });
    }

    /// Disconnects every watcher of the listing, they need to reconnect to
    /// get their access checked again
    pub async fn close_listing(&self, listing: ListingId) {
        if let Some(socks) = self.0.write().await.remove(&listing) {
            tracing::debug!(?listing, watchers = socks.len(), "closing comment feeds");
        }
    }

    pub async fn relay(&self, e: CommentEvent) {
        let listing = e.car_id();
        if let Some(socks) = self.0.read().await.get(&listing) {
            tracing::trace!(?listing, watchers = socks.len(), "relaying comment event");
            for s in socks.values() {
                // dead sockets get removed by their relayer task
                let _ = s.unbounded_send(FeedMessage::Comment(e.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use carmart_api::CommentId;
    use futures::channel::mpsc as chan;

    use super::*;

    async fn wait_for_watchers(feeds: &CommentFeeds, listing: ListingId, n: usize) {
        for _ in 0..100 {
            if feeds.num_watchers(listing).await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("listing {listing:?} never got {n} watchers");
    }

    #[tokio::test]
    async fn relays_to_watchers_of_the_listing() {
        let feeds = CommentFeeds::new();
        let (write_a, mut out_a) = chan::unbounded::<Message>();
        let (in_a, read_a) = chan::unbounded::<Result<Message, axum::Error>>();
        let (write_b, mut out_b) = chan::unbounded::<Message>();
        let (in_b, read_b) = chan::unbounded::<Result<Message, axum::Error>>();
        feeds.clone().add_for_listing(ListingId(1), write_a, read_a).await;
        feeds.clone().add_for_listing(ListingId(2), write_b, read_b).await;

        let deleted = CommentEvent::Deleted {
            car_id: ListingId(1),
            comment_id: CommentId(7),
        };
        feeds.relay(deleted.clone()).await;
        match out_a.next().await {
            Some(Message::Text(json)) => assert_eq!(
                serde_json::from_str::<FeedMessage>(&json).unwrap(),
                FeedMessage::Comment(deleted)
            ),
            m => panic!("unexpected message {m:?}"),
        }

        in_b.unbounded_send(Ok(Message::Text(String::from("ping")))).unwrap();
        match out_b.next().await {
            Some(Message::Text(json)) => assert_eq!(
                serde_json::from_str::<FeedMessage>(&json).unwrap(),
                FeedMessage::Pong
            ),
            m => panic!("unexpected message {m:?}"),
        }

        // closing the socket unregisters it
        drop(in_a);
        wait_for_watchers(&feeds, ListingId(1), 0).await;
        assert_eq!(feeds.num_watchers(ListingId(2)).await, 1);
    }

    #[tokio::test]
    async fn closed_listing_stops_relaying() {
        let feeds = CommentFeeds::new();
        let (write, mut out) = chan::unbounded::<Message>();
        let (_in, read) = chan::unbounded::<Result<Message, axum::Error>>();
        feeds.clone().add_for_listing(ListingId(3), write, read).await;
        assert_eq!(feeds.num_watchers(ListingId(3)).await, 1);

        feeds.close_listing(ListingId(3)).await;
        assert_eq!(feeds.num_watchers(ListingId(3)).await, 0);
        feeds
            .relay(CommentEvent::Deleted {
                car_id: ListingId(3),
                comment_id: CommentId(1),
            })
            .await;
        // the relayer task ends and drops the socket without sending anything
        assert!(out.next().await.is_none());
    }
}
