// src/protocol/patterns/mod.rs

//! Building blocks shared by the protocol implementations.

pub(crate) mod distributor;
pub(crate) mod fair_queue;
pub(crate) mod load_balancer;
pub(crate) mod priolist;
pub(crate) mod trie;

pub(crate) use distributor::Distributor;
pub(crate) use fair_queue::FairQueue;
pub(crate) use load_balancer::LoadBalancer;
pub(crate) use priolist::PrioList;
pub(crate) use trie::SubscriptionTrie;
