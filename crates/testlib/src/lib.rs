pub mod bidders;
