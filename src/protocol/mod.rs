//! Wire protocol: framed JSON records exchanged with clients
//!
//! | type        | direction        | fields                                  |
//! |-------------|------------------|-----------------------------------------|
//! | `open`      | client -> server | name, username, password                |
//! | `edit`      | client -> server | cell, value, dependencies               |
//! | `undo`      | client -> server |                                         |
//! | `revert`    | client -> server | cell                                    |
//! | `admin`     | client -> server |                                         |
//! | `close`     | client -> server |                                         |
//! | `user`      | client -> server | order (new/change/delete), username, password |
//! | `sheet`     | client -> server | order (new/delete), name                |
//! | `full send` | server -> client | spreadsheet                             |
//! | `error`     | server -> client | code (1 credentials, 2 circular), source |
//! | `list`      | server -> client | spreadsheets                            |
//! | `state`     | server -> client | users                                   |
//! | `message`   | server -> client | msg                                     |

pub mod command;
pub mod frame;
pub mod message;

pub use command::{Command, SheetOrder, UserOrder};
pub use frame::FrameBuffer;
pub use message::{ErrorCode, ServerMessage};
