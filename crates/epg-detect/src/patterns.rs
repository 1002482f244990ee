//! Named traversal patterns over the per-transaction dependency graph.
//!
//! Each constructor returns an unfinished [`Traversal`]; the detectors
//! attach the evaluation deadline at the source and any terminal steps
//! (`limit`, `count`) before submission.
//!
//! Vertex labels: `contractCall` frames of the call tree, `assetFlow`
//! value transfers, `dataSource` storage/environment reads. Edge labels:
//! `call`, `transfer`, `jump`, `dcfg_to_asset_flow`, `dataflow:read`,
//! `dataflow:write`, `dataflow:control`, `dataflow:dependency`,
//! `dataflow:transition`.

use crate::script::Traversal;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Step names selected by the reentrancy patterns, in selection order.
pub const REENTRANCY_STEPS: [&str; 8] = [
	"attacker",
	"re_attacker",
	"victim",
	"re_victim",
	"state_change",
	"state_change_dcfg",
	"victim_flow",
	"victim_flow_dcfg",
];

/// Attacker/victim/re-entry call-pair prefix shared by both reentrancy
/// patterns: an attacker frame reaching a distinct victim frame, the same
/// attacker address re-entered below the victim, and the victim address
/// re-entered below that. Delegate calls stay in the caller's storage
/// context and are excluded at every hop.
fn reentrancy_call_pairs(source: Traversal, pair_limit: u64) -> Traversal {
	source
		.v()
		.has_label("contractCall")
		.tag("attacker")
		.repeat_emit(Traversal::anon().out("call"))
		.tag("victim")
		.in_e("call")
		.has_neq("callTrace:type", "DELEGATECALL")
		.where_neq("attacker", "victim")
		.by("address")
		.select("victim")
		.limit(pair_limit)
		.repeat_emit(Traversal::anon().out("call"))
		.tag("re_attacker")
		.in_e("call")
		.has_neq("callTrace:type", "DELEGATECALL")
		.where_eq("attacker", "re_attacker")
		.by("address")
		.select("re_attacker")
		.repeat_emit(Traversal::anon().out("call"))
		.tag("re_victim")
		.in_e("call")
		.has_neq("callTrace:type", "DELEGATECALL")
		.where_eq("victim", "re_victim")
		.by("address")
		.select("re_victim")
		.limit(pair_limit)
}

/// Guard applied to a state-change candidate: its writing instruction must
/// sit in a frame of the victim's call subtree.
fn written_under_victim() -> Traversal {
	Traversal::anon()
		.repeat_emit(Traversal::anon().in_("jump"))
		.has_label("contractCall")
		.emit_repeat(Traversal::anon().in_("call"))
		.where_is("victim")
		.count()
		.is_gt(0)
}

/// Reentrancy, control-dependency variant: the victim's outgoing transfer
/// is control-dependent on a storage slot that the re-entered subtree
/// rewrites. Pairs each guarded transfer instruction with the rewriting
/// instruction so their graph positions can be ordered.
pub fn reentrancy_control_dependency(source: Traversal, pair_limit: u64) -> Traversal {
	reentrancy_call_pairs(source, pair_limit).local(
		Traversal::anon()
			.emit_repeat(Traversal::anon().out("call"))
			.out("transfer")
			.tag("victim_flow")
			.in_("dcfg_to_asset_flow")
			.dedup()
			.tag("victim_flow_dcfg")
			.emit_repeat(Traversal::anon().in_("jump"))
			.in_("dataflow:control")
			.emit_repeat(Traversal::anon().in_("dataflow:dependency"))
			.dedup()
			.has("sourceType", "Storage")
			.repeat_emit(Traversal::anon().out("dataflow:transition"))
			.tag("state_change")
			.in_("dataflow:write")
			.tag("state_change_dcfg")
			.dedup()
			.where_traversal(written_under_victim())
			.select_all(&REENTRANCY_STEPS)
			.by_element_map()
			.dedup(),
	)
}

/// Reentrancy, amount-dependency variant: the transferred amount itself is
/// read from a storage slot that the re-entered subtree rewrites.
pub fn reentrancy_amount_dependency(source: Traversal, pair_limit: u64) -> Traversal {
	reentrancy_call_pairs(source, pair_limit).local(
		Traversal::anon()
			.emit_repeat(Traversal::anon().out("call"))
			.out("transfer")
			.tag("victim_flow")
			.out("dataflow:read")
			.dedup()
			.emit_repeat(Traversal::anon().in_("dataflow:dependency"))
			.dedup()
			.has("sourceType", "Storage")
			.repeat_emit(Traversal::anon().out("dataflow:transition"))
			.tag("state_change")
			.in_("dataflow:write")
			.tag("state_change_dcfg")
			.dedup()
			.where_traversal(written_under_victim())
			.select("victim_flow")
			.in_("dcfg_to_asset_flow")
			.tag("victim_flow_dcfg")
			.select_all(&REENTRANCY_STEPS)
			.by_element_map()
			.dedup(),
	)
}

/// Oracle check: does any asset flow read a price that an external caller
/// can steer? The flow's amount must depend on a storage slot whose
/// writing instruction is control-dependent on caller-tainted data.
pub fn oracle_manipulable_price(source: Traversal) -> Traversal {
	source
		.v()
		.has_label("assetFlow")
		.where_traversal(
			Traversal::anon()
				.out("dataflow:read")
				.dedup()
				.emit_repeat(Traversal::anon().in_("dataflow:dependency"))
				.dedup()
				.has("sourceType", "Storage")
				.in_("dataflow:write")
				.dedup()
				.emit_repeat(Traversal::anon().in_("jump"))
				.in_("dataflow:control")
				.dedup()
				.emit_repeat(Traversal::anon().in_("dataflow:dependency"))
				.has("sourceType", "Caller")
				.limit(1)
				.count()
				.is_gt(0),
		)
		.element_map()
}

/// Oracle check: how often is the most-rewritten manipulable price slot
/// written during the transaction? Yields at most one number, the maximum
/// write count across manipulable slots.
pub fn oracle_price_change_times(source: Traversal) -> Traversal {
	source
		.v()
		.has_label("assetFlow")
		.local(
			Traversal::anon()
				.out("dataflow:read")
				.dedup()
				.emit_repeat(Traversal::anon().in_("dataflow:dependency"))
				.dedup()
				.has("sourceType", "Storage")
				.tag("price")
				.local(
					Traversal::anon()
						.in_("dataflow:write")
						.dedup()
						.emit_repeat(Traversal::anon().in_("jump"))
						.in_("dataflow:control")
						.dedup()
						.emit_repeat(Traversal::anon().in_("dataflow:dependency"))
						.has("sourceType", "Caller")
						.where_traversal(Traversal::anon().limit(1).count().is_gt(0)),
				)
				.select("price"),
		)
		.dedup()
		.group()
		.by("sourceId")
		.by_traversal(
			Traversal::anon()
				.local(
					Traversal::anon()
						.repeat_emit(Traversal::anon().out("dataflow:transition"))
						.in_("dataflow:write")
						.count(),
				)
				.max(),
		)
		.select_group_values()
		.unfold()
		.max()
}

/// Oracle check: does the transaction contain a swap, two asset flows in
/// opposite directions between the same parties in different assets? Burns
/// and mints (zero-address endpoints) do not count.
pub fn oracle_has_swap(source: Traversal) -> Traversal {
	source
		.v()
		.has_label("assetFlow")
		.tag("token1")
		.has_neq("to", ZERO_ADDRESS)
		.has_neq("from", ZERO_ADDRESS)
		.v()
		.has_label("assetFlow")
		.tag("token2")
		.has_neq("to", ZERO_ADDRESS)
		.has_neq("from", ZERO_ADDRESS)
		.where_neq("token1", "token2")
		.by("asset")
		.select("token1")
		.has_matching("from", Traversal::anon().select("token2").values("to"))
		.has_matching("to", Traversal::anon().select("token2").values("from"))
		.limit(1)
		.count()
}

/// Oracle check: does the transaction contain a borrow, one collateral
/// flow whose recipient pays out two further flows in distinct assets?
pub fn oracle_has_borrow(source: Traversal) -> Traversal {
	source
		.v()
		.has_label("assetFlow")
		.tag("collateral")
		.has_neq("to", ZERO_ADDRESS)
		.has_neq("from", ZERO_ADDRESS)
		.v()
		.has_label("assetFlow")
		.tag("token1")
		.has_neq("to", ZERO_ADDRESS)
		.v()
		.has_label("assetFlow")
		.tag("token2")
		.has_neq("to", ZERO_ADDRESS)
		.where_neq("collateral", "token1")
		.by("asset")
		.where_neq("collateral", "token2")
		.by("asset")
		.where_neq("token1", "token2")
		.by("asset")
		.select("collateral")
		.has_matching("to", Traversal::anon().select("token1").values("from"))
		.has_matching("to", Traversal::anon().select("token2").values("from"))
		.limit(1)
		.count()
}
