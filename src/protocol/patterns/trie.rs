// src/protocol/patterns/trie.rs

use std::collections::HashMap;

/// A node in the subscription trie.
#[derive(Debug, Default)]
struct TrieNode {
  children: HashMap<u8, TrieNode>,
  /// Count of subscriptions ending exactly at this node.
  count: usize,
}

impl TrieNode {
  fn is_empty(&self) -> bool {
    self.count == 0 && self.children.is_empty()
  }
}

/// Manages topic subscriptions using a prefix trie for efficient matching.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionTrie {
  root: TrieNode,
}

impl SubscriptionTrie {
  /// Adds a subscription topic (prefix).
  /// Increments the count if the topic already exists.
  pub fn subscribe(&mut self, topic: &[u8]) {
    let mut node = &mut self.root;
    for &byte in topic {
      node = node.children.entry(byte).or_default();
    }
    node.count += 1;
    tracing::debug!(topic = ?String::from_utf8_lossy(topic), count = node.count, "Subscribed");
  }

  /// Removes one subscription for `topic`, pruning nodes left empty.
  /// Returns false if there was no such subscription.
  pub fn unsubscribe(&mut self, topic: &[u8]) -> bool {
    let removed = Self::unsubscribe_at(&mut self.root, topic);
    if removed {
      tracing::debug!(topic = ?String::from_utf8_lossy(topic), "Unsubscribed");
    } else {
      tracing::debug!(topic = ?String::from_utf8_lossy(topic), "Unsubscribe failed: Topic not found");
    }
    removed
  }

  fn unsubscribe_at(node: &mut TrieNode, rest: &[u8]) -> bool {
    let Some((&byte, tail)) = rest.split_first() else {
      if node.count == 0 {
        return false;
      }
      node.count -= 1;
      return true;
    };
    let Some(child) = node.children.get_mut(&byte) else {
      return false;
    };
    let removed = Self::unsubscribe_at(child, tail);
    if removed && child.is_empty() {
      node.children.remove(&byte);
    }
    removed
  }

  /// Checks if a message body starts with any subscribed prefix.
  pub fn matches(&self, body: &[u8]) -> bool {
    let mut node = &self.root;
    if node.count > 0 {
      return true; // Matches empty subscription
    }
    for byte in body {
      match node.children.get(byte) {
        Some(next) => node = next,
        None => return false,
      }
      if node.count > 0 {
        return true;
      }
    }
    false
  }

  #[cfg(test)]
  pub fn is_empty(&self) -> bool {
    self.root.is_empty()
  }
}
