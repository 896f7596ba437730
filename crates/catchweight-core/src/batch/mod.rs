pub mod reconcile;
pub mod tree;

pub use reconcile::{
    add_sub_batch, can_merge, delete_orphans, explode_groups_to_sub_batches,
    find_child_by_qv_value, fold_sub_batches_into_parents, link_to_available_parents,
    merge_identical, same_group, set_available_parents, FoldReport, LinkReport,
};
pub use tree::{
    children_by_level, compute_individual_count, compute_rank_order, compute_weight_length_sum,
    get_or_create_sampling_child, observed_individual_count, sampling_child,
};
