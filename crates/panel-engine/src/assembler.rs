//! Packet assembler
//!
//! Concatenates fragments into one [`Transaction`]:
//!
//! 1. Fragments are walked in caller order.
//! 2. A fragment flagged `level1_key` / `level2_key` is wrapped in the
//!    matching unlock fragment before it and lock fragment after it.
//! 3. The descriptor count is checked against capacity before anything is
//!    copied; an overflow returns [`EngineError::PacketOverflow`] and no
//!    transaction exists to dispatch.
//! 4. Last-packet framing: long writes batch together, anything else
//!    closes the burst before it and forms its own burst. The final
//!    descriptor always closes.

use std::vec::Vec;

use panel_platform::{Descriptor, Revision, TransmissionSpeed};

use crate::error::EngineError;
use crate::fragment::{CommandFragment, FragmentId, FragmentRegistry};

/// One fragment and which of its commands go out.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    /// Source fragment.
    pub fragment: &'a CommandFragment,
    /// `true` for each command to include; shorter masks include the rest.
    pub keep: Vec<bool>,
}

impl<'a> Part<'a> {
    /// Every command of `fragment`.
    pub fn whole(fragment: &'a CommandFragment) -> Self {
        Self {
            fragment,
            keep: Vec::new(),
        }
    }

    fn kept(&self) -> impl Iterator<Item = &'a Descriptor> + '_ {
        self.fragment
            .commands
            .iter()
            .enumerate()
            .filter(|(i, _)| self.keep.get(*i).copied().unwrap_or(true))
            .map(|(_, c)| c.descriptor())
    }
}

/// Register unlock/lock fragments for one revision.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlockKeys<'a> {
    level1: Option<(&'a CommandFragment, &'a CommandFragment)>,
    level2: Option<(&'a CommandFragment, &'a CommandFragment)>,
}

impl<'a> UnlockKeys<'a> {
    /// Look up both key pairs. A level missing either half is not wrapped.
    pub fn select(registry: &'a FragmentRegistry, rev: Revision) -> Self {
        let pair = |enable, disable| {
            registry
                .select(enable, rev)
                .zip(registry.select(disable, rev))
        };
        Self {
            level1: pair(FragmentId::Level1KeyEnable, FragmentId::Level1KeyDisable),
            level2: pair(FragmentId::Level2KeyEnable, FragmentId::Level2KeyDisable),
        }
    }

    fn wrappers(&self, fragment: &CommandFragment) -> (Vec<&'a CommandFragment>, Vec<&'a CommandFragment>) {
        let mut before = Vec::new();
        let mut after = Vec::new();
        let levels = [
            (fragment.level1_key, self.level1),
            (fragment.level2_key, self.level2),
        ];
        for (wanted, keys) in levels {
            match (wanted, keys) {
                (true, Some((enable, disable))) => {
                    before.push(enable);
                    after.insert(0, disable);
                }
                (true, None) => {
                    tracing::warn!(fragment = fragment.id.name(), "unlock key requested but not configured");
                }
                (false, _) => {}
            }
        }
        (before, after)
    }
}

/// Framing applied to an assembled transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Long writes batch; every burst ends with one last flag.
    Batched,
    /// Every descriptor is its own burst.
    Individual,
}

/// Descriptors ready for one transport call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    descriptors: Vec<Descriptor>,
    fragments: Vec<FragmentId>,
    speed: TransmissionSpeed,
}

impl Transaction {
    /// Transaction with nothing to send.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Descriptors in send order.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Fragments that contributed descriptors, wrappers excluded.
    pub fn fragments(&self) -> &[FragmentId] {
        &self.fragments
    }

    /// Number of contributing fragments.
    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Link speed. Low power if any fragment asked for it.
    pub fn speed(&self) -> TransmissionSpeed {
        self.speed
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// `true` when there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Total payload bytes.
    pub fn payload_bytes(&self) -> usize {
        self.descriptors.iter().map(Descriptor::len).sum()
    }

    /// Descriptors flagged last.
    pub fn last_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.last).count()
    }

    /// Physical bursts implied by the descriptor types.
    pub fn burst_count(&self) -> usize {
        let ends_burst = |(i, d): (usize, &Descriptor)| {
            match self.descriptors.get(i.saturating_add(1)) {
                Some(next) => !d.data_type.is_long_write() || !next.data_type.is_long_write(),
                None => true,
            }
        };
        self.descriptors
            .iter()
            .enumerate()
            .filter(|&(i, d)| ends_burst((i, d)))
            .count()
    }

    /// Consume into descriptors.
    pub fn into_descriptors(self) -> Vec<Descriptor> {
        self.descriptors
    }
}

/// Assemble `parts` into one transaction of at most `capacity` descriptors.
pub fn assemble(
    parts: &[Part<'_>],
    keys: &UnlockKeys<'_>,
    capacity: usize,
    framing: Framing,
) -> Result<Transaction, EngineError> {
    let mut plan: Vec<(Vec<&CommandFragment>, &Part<'_>, Vec<&CommandFragment>)> = Vec::new();
    let mut needed = 0usize;
    for part in parts {
        let kept = part.kept().count();
        if kept == 0 {
            continue;
        }
        let (before, after) = keys.wrappers(part.fragment);
        let wrapper_len: usize = before.iter().chain(&after).map(|f| f.len()).sum();
        needed = needed.saturating_add(kept).saturating_add(wrapper_len);
        plan.push((before, part, after));
    }

    if needed > capacity {
        tracing::error!(needed, capacity, "transaction exceeds packet capacity");
        return Err(EngineError::PacketOverflow { needed, capacity });
    }

    let mut tx = Transaction {
        descriptors: Vec::with_capacity(needed),
        fragments: Vec::with_capacity(plan.len()),
        speed: TransmissionSpeed::HighSpeed,
    };
    for (before, part, after) in &plan {
        for wrapper in before {
            tx.descriptors.extend(wrapper.commands.iter().map(|c| c.descriptor().clone()));
        }
        tx.descriptors.extend(part.kept().cloned());
        for wrapper in after {
            tx.descriptors.extend(wrapper.commands.iter().map(|c| c.descriptor().clone()));
        }
        tx.fragments.push(part.fragment.id);
        if part.fragment.speed == TransmissionSpeed::LowPower {
            tx.speed = TransmissionSpeed::LowPower;
        }
    }
    if tx.descriptors.is_empty() {
        tx.speed = TransmissionSpeed::default();
    }

    frame(&mut tx.descriptors, framing);
    tracing::debug!(
        descriptors = tx.len(),
        fragments = tx.fragment_count(),
        bursts = tx.last_count(),
        "assembled transaction"
    );
    Ok(tx)
}

/// Set last-packet flags.
pub fn frame(descriptors: &mut [Descriptor], framing: Framing) {
    if framing == Framing::Individual {
        for d in descriptors.iter_mut() {
            d.last = true;
        }
        return;
    }
    let mut previous: Option<&mut Descriptor> = None;
    for d in descriptors.iter_mut() {
        if d.data_type.is_long_write() {
            d.last = false;
        } else {
            d.last = true;
            if let Some(p) = previous {
                p.last = true;
            }
        }
        previous = Some(d);
    }
    if let Some(final_descriptor) = previous {
        final_descriptor.last = true;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fragment::{short_write, CommandDescriptor};
    use panel_platform::DataType;

    fn long(payload: &[u8]) -> CommandDescriptor {
        CommandDescriptor::fixed(Descriptor::write(DataType::GenericLongWrite, payload.to_vec()))
    }

    fn fragment(id: FragmentId, commands: Vec<CommandDescriptor>) -> CommandFragment {
        CommandFragment::new(id, TransmissionSpeed::HighSpeed, commands)
    }

    fn lasts(tx: &Transaction) -> Vec<bool> {
        tx.descriptors().iter().map(|d| d.last).collect()
    }

    #[test]
    fn long_write_closes_before_short_write() {
        let gamma = fragment(FragmentId::Gamma, vec![long(&[0xCA, 1]), long(&[0xB1, 2])]);
        let acl = fragment(FragmentId::AclOff, vec![short_write(vec![0x55]), long(&[0xB5, 3])]);
        let tx = assemble(
            &[Part::whole(&gamma), Part::whole(&acl)],
            &UnlockKeys::default(),
            16,
            Framing::Batched,
        )
        .expect("fits");
        assert_eq!(lasts(&tx), [false, true, true, true]);
        assert_eq!(tx.last_count(), tx.burst_count());
        assert_eq!(tx.fragments(), [FragmentId::Gamma, FragmentId::AclOff]);
    }

    #[test]
    fn unlock_wrappers_surround_flagged_fragment() {
        let mut registry = FragmentRegistry::new();
        let enable = fragment(FragmentId::Level2KeyEnable, vec![long(&[0xF0, 0x5A, 0x5A])]);
        let disable = fragment(FragmentId::Level2KeyDisable, vec![long(&[0xF0, 0xA5, 0xA5])]);
        registry.insert(Revision::A, enable);
        registry.insert(Revision::A, disable);

        let mut gamma = fragment(FragmentId::Gamma, vec![long(&[0xCA, 1])]);
        gamma.level2_key = true;
        let aid = fragment(FragmentId::Aid, vec![long(&[0xB1, 2])]);
        let keys = UnlockKeys::select(&registry, Revision::A);
        let tx = assemble(
            &[Part::whole(&gamma), Part::whole(&aid)],
            &keys,
            16,
            Framing::Batched,
        )
        .expect("fits");
        let heads: Vec<u8> = tx
            .descriptors()
            .iter()
            .filter_map(|d| d.payload.get(1).copied())
            .collect();
        assert_eq!(heads, [0x5A, 1, 0xA5, 2]);
        assert_eq!(tx.fragment_count(), 2);
    }

    #[test]
    fn overflow_is_rejected_whole() {
        let big = fragment(FragmentId::SelfMaskImage, (0..5).map(|i| long(&[0x4C, i])).collect());
        let err = assemble(&[Part::whole(&big)], &UnlockKeys::default(), 4, Framing::Batched);
        assert_eq!(err, Err(EngineError::PacketOverflow { needed: 5, capacity: 4 }));
    }

    #[test]
    fn skipped_commands_are_left_out() {
        let gamma = fragment(FragmentId::Gamma, vec![long(&[0xCA, 1]), long(&[0xCA, 2])]);
        let part = Part {
            fragment: &gamma,
            keep: vec![false, true],
        };
        let tx = assemble(&[part], &UnlockKeys::default(), 1, Framing::Batched).expect("fits");
        assert_eq!(tx.len(), 1);
        assert_eq!(lasts(&tx), [true]);
    }

    #[test]
    fn nothing_resolved_is_empty_transaction() {
        let empty = fragment(FragmentId::Gamma, Vec::new());
        let tx = assemble(&[Part::whole(&empty)], &UnlockKeys::default(), 1, Framing::Batched)
            .expect("empty is fine");
        assert!(tx.is_empty());
        assert_eq!(tx.fragment_count(), 0);
    }

    #[test]
    fn low_power_fragment_lowers_transaction() {
        let mut lp = fragment(FragmentId::AodBrightness, vec![long(&[0x53, 1])]);
        lp.speed = TransmissionSpeed::LowPower;
        let hs = fragment(FragmentId::Gamma, vec![long(&[0xCA, 1])]);
        let tx = assemble(
            &[Part::whole(&hs), Part::whole(&lp)],
            &UnlockKeys::default(),
            4,
            Framing::Batched,
        )
        .expect("fits");
        assert_eq!(tx.speed(), TransmissionSpeed::LowPower);
    }

    #[test]
    fn individual_framing_marks_every_descriptor() {
        let gamma = fragment(FragmentId::Gamma, vec![long(&[0xCA, 1]), long(&[0xCA, 2])]);
        let tx = assemble(&[Part::whole(&gamma)], &UnlockKeys::default(), 4, Framing::Individual)
            .expect("fits");
        assert_eq!(lasts(&tx), [true, true]);
    }
}
