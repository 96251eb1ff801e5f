//! Sequences and node list diffs.
//!
//! A list of nodes owned by a node that was already sent is written as an
//! edit script against the client's copy:
//!
//! ```text
//! {"$a":[0, token...],"$l":n}
//! ```
//!
//! The client cuts its array to `n`, the number of old elements still in use,
//! then replays the tokens from last to first, starting at the end of the
//! array. An integer steps over that many unchanged elements, `{"$d":n}`
//! deletes the `n` elements before the cursor, `{"$i":n}` turns the next `n`
//! values into insertions, and any other value replaces or patches the
//! element before the cursor. The leading `0` is a no-op anchor.
//!
//! Output grows with the number of changed, inserted and removed elements,
//! not with the length of the list.

use super::{EncOpts, EncodeState, ListCtx, NodeCtx};
use crate::error::Result;
use crate::model::ModelState;
use crate::reflect::{ReflectSeq, TypeEncoder};
use bytes::BufMut;

impl EncodeState {
    pub(super) fn encode_seq<'v>(
        &mut self,
        element: &TypeEncoder,
        seq: &'v dyn ReflectSeq,
        opts: EncOpts<'v>,
    ) -> Result<()> {
        match opts.list {
            Some(list) if list.parent.state != ModelState::New => {
                self.encode_list_diff(element, seq, list)
            }
            Some(list) => self.encode_node_array(element, seq, list),
            None => self.encode_array(element, seq),
        }
    }

    fn encode_array(&mut self, element: &TypeEncoder, seq: &dyn ReflectSeq) -> Result<()> {
        self.buf.put_u8(b'[');
        for i in 0..seq.len() {
            if i > 0 {
                self.buf.put_u8(b',');
            }
            self.encode_value(element, seq.element(i), EncOpts::default())?;
        }
        self.buf.put_u8(b']');
        Ok(())
    }

    /// Full array for a list whose owner is new. Every element is new too.
    fn encode_node_array<'v>(
        &mut self,
        element: &TypeEncoder,
        seq: &'v dyn ReflectSeq,
        list: ListCtx<'v>,
    ) -> Result<()> {
        self.buf.put_u8(b'[');
        for i in 0..seq.len() {
            if i > 0 {
                self.buf.put_u8(b',');
            }
            let value = seq.element(i);
            let Some(model) = value.node_model() else {
                self.encode_value(element, value, EncOpts::default())?;
                continue;
            };
            let state =
                self.enter_node(model, Some(list.parent), Some(list.slot), value.type_name())?;
            model.swap_position(i);
            self.encode_value(element, value, EncOpts::node(NodeCtx { model, state }))?;
            model.mark_synced();
        }
        self.buf.put_u8(b']');
        Ok(())
    }

    fn flush_skip(&mut self, skip: &mut usize) {
        if *skip > 0 {
            self.buf.put_slice(format!(",{}", skip).as_bytes());
            *skip = 0;
        }
    }

    fn encode_list_diff<'v>(
        &mut self,
        element: &TypeEncoder,
        seq: &'v dyn ReflectSeq,
        list: ListCtx<'v>,
    ) -> Result<()> {
        self.buf.put_slice(b"{\"$a\":[0");
        // End of the old prefix confirmed so far.
        let mut old_index = 0usize;
        let mut insert_count = 0usize;
        let mut skip_count = 0usize;

        for i in 0..seq.len() {
            let value = seq.element(i);
            let Some(model) = value.node_model() else {
                self.flush_skip(&mut skip_count);
                insert_count += 1;
                self.buf.put_slice(b",null");
                continue;
            };

            let mut state =
                self.enter_node(model, Some(list.parent), Some(list.slot), value.type_name())?;
            let index = model.swap_position(i);
            if state != ModelState::New && index < old_index {
                // Moved in front of an element it used to follow.
                model.mark_new();
                state = ModelState::New;
            }

            if state == ModelState::New {
                insert_count += 1;
            } else {
                if index > old_index || insert_count > 0 {
                    self.flush_skip(&mut skip_count);
                    let removed = index - old_index;
                    if removed > insert_count {
                        let token = format!(",{{\"$d\":{}}}", removed - insert_count);
                        self.buf.put_slice(token.as_bytes());
                    } else if insert_count > removed {
                        let token = format!(",{{\"$i\":{}}}", insert_count - removed);
                        self.buf.put_slice(token.as_bytes());
                    }
                    insert_count = 0;
                }
                old_index = index + 1;
            }

            if state == ModelState::Synced {
                skip_count += 1;
                continue;
            }

            self.flush_skip(&mut skip_count);
            self.buf.put_u8(b',');
            self.encode_value(element, value, EncOpts::node(NodeCtx { model, state }))?;
            model.mark_synced();
        }

        if insert_count > 0 {
            let token = format!(",{{\"$i\":{}}}", insert_count);
            self.buf.put_slice(token.as_bytes());
        }
        self.flush_skip(&mut skip_count);
        let tail = format!("],\"$l\":{}}}", old_index);
        self.buf.put_slice(tail.as_bytes());
        Ok(())
    }
}
