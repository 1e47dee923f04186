//! Command Dispatch
//!
//! Maps a decoded argument list onto the key space and produces the
//! response to send back.
//!
//! Commands are matched by case-insensitive name plus exact arity:
//!
//! - `GET key` - the stored value as a string, or Nil if absent
//! - `SET key value` - upsert; always Nil
//! - `DEL key` - Int 1 if a key was removed, else Int 0
//! - `KEYS` - array of every stored key, in table order
//!
//! Anything else - unknown name, wrong arity - earns an `Err` response
//! with the unknown-command code; the connection stays open.

use crate::protocol::Response;
use crate::storage::KeySpace;
use bytes::Bytes;

/// Executes one request against the key space.
pub fn dispatch(db: &mut KeySpace, args: &[Bytes]) -> Response {
    match args.split_first() {
        Some((name, rest)) if name.eq_ignore_ascii_case(b"get") && rest.len() == 1 => {
            cmd_get(db, &rest[0])
        }
        Some((name, rest)) if name.eq_ignore_ascii_case(b"set") && rest.len() == 2 => {
            cmd_set(db, rest[0].clone(), rest[1].clone())
        }
        Some((name, rest)) if name.eq_ignore_ascii_case(b"del") && rest.len() == 1 => {
            cmd_del(db, &rest[0])
        }
        Some((name, rest)) if name.eq_ignore_ascii_case(b"keys") && rest.is_empty() => {
            cmd_keys(db)
        }
        _ => Response::unknown_command(),
    }
}

fn cmd_get(db: &mut KeySpace, key: &[u8]) -> Response {
    match db.get(key) {
        Some(value) => Response::Str(value.clone()),
        None => Response::Nil,
    }
}

fn cmd_set(db: &mut KeySpace, key: Bytes, value: Bytes) -> Response {
    db.insert(key, value);
    Response::Nil
}

fn cmd_del(db: &mut KeySpace, key: &[u8]) -> Response {
    match db.remove(key) {
        Some(_) => Response::Int(1),
        None => Response::Int(0),
    }
}

fn cmd_keys(db: &mut KeySpace) -> Response {
    let mut keys = Vec::with_capacity(db.len());
    db.for_each(|key, _| keys.push(Response::Str(key.clone())));
    Response::Array(keys)
}
