mod writer;

mod cache;
mod primitive;
