//! Packets produced by the authoritative state during one tick.
//!
//! Game logic never touches the socket; it queues packets here and the network
//! layer drains the queue at the end of the same tick.

use shared::Packet;

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Send { client_id: u32, packet: Packet },
    Broadcast { packet: Packet, exclude: Option<u32> },
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, client_id: u32, packet: Packet) {
        self.queue.push(Outgoing::Send { client_id, packet });
    }

    pub fn broadcast(&mut self, packet: Packet, exclude: Option<u32>) {
        self.queue.push(Outgoing::Broadcast { packet, exclude });
    }

    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outgoing> {
        self.queue.iter()
    }

    /// Packets queued so far that `client_id` would receive, in order.
    pub fn packets_for(&self, client_id: u32) -> Vec<&Packet> {
        self.queue
            .iter()
            .filter_map(|outgoing| match outgoing {
                Outgoing::Send { client_id: id, packet } if *id == client_id => Some(packet),
                Outgoing::Broadcast { packet, exclude } if *exclude != Some(client_id) => {
                    Some(packet)
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packets_for_respects_exclusion() {
        let mut outbox = Outbox::new();
        outbox.send(1, Packet::Connected { client_id: 1 });
        outbox.broadcast(Packet::TogglePvp { hostile: true }, Some(1));
        outbox.broadcast(Packet::Disconnect, None);

        assert_eq!(outbox.len(), 3);
        assert_eq!(outbox.packets_for(1).len(), 2);
        assert_eq!(outbox.packets_for(2).len(), 2);

        let drained = outbox.drain();
        assert_eq!(drained.len(), 3);
        assert!(outbox.is_empty());
    }
}
