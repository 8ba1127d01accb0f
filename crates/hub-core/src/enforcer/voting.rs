//! Point assignment over one fan-out's responses.
//!
//! Voting never discards a response: disagreeing but well-formed payloads are
//! simply not rewarded, and only errors or a lost majority earn an invalid
//! point.

use crate::types::DataResponse;

/// Orders responses valid first, then error-free, then errored. The sort is
/// stable so completion order breaks ties.
pub fn sort_by_validity(responses: &mut [DataResponse]) {
    responses.sort_by_key(|r| match (r.is_err(), r.valid) {
        (false, true) => 0u8,
        (false, false) => 1,
        (true, _) => 2,
    });
}

/// Assigns `valid_point` / `invalid_point` in place.
///
/// `identical` decides semantic identity of two error-free responses.
pub fn assign_points<F>(responses: &mut [DataResponse], identical: F)
where
    F: Fn(&DataResponse, &DataResponse) -> bool,
{
    for response in responses.iter_mut() {
        if response.is_err() {
            response.invalid_point += 1;
        }
    }

    match responses.len() {
        0 => {}
        1 => {
            if !responses[0].is_err() {
                responses[0].valid_point = 1;
            }
        }
        2 => pair_rule(responses, 0, 1, &identical),
        _ => three_way_rule(responses, &identical),
    }
}

/// Two-response rule over `responses[a]` and `responses[b]`, `a` first.
fn pair_rule<F>(responses: &mut [DataResponse], a: usize, b: usize, identical: &F)
where
    F: Fn(&DataResponse, &DataResponse) -> bool,
{
    let (a_err, b_err) = (responses[a].is_err(), responses[b].is_err());
    if a_err || b_err {
        for index in [a, b] {
            if !responses[index].is_err() {
                responses[index].valid_point = 1;
            }
        }
        return;
    }

    if identical(&responses[a], &responses[b]) {
        responses[a].valid_point = 2;
        responses[b].valid_point = 1;
    } else {
        responses[a].valid_point = 1;
    }
}

/// Rule for three or more responses; only the first three take part.
fn three_way_rule<F>(responses: &mut [DataResponse], identical: &F)
where
    F: Fn(&DataResponse, &DataResponse) -> bool,
{
    let survivors: Vec<usize> = (0..3).filter(|&i| !responses[i].is_err()).collect();
    match survivors.as_slice() {
        [] => {}
        [only] => responses[*only].valid_point = 1,
        [a, b] => pair_rule(responses, *a, *b, identical),
        _ => {
            let d01 = identical(&responses[0], &responses[1]);
            let d02 = identical(&responses[0], &responses[2]);

            if d01 && d02 {
                award(responses, &[(0, 2), (1, 1), (2, 1)]);
            } else if d01 {
                award(responses, &[(0, 2), (1, 1)]);
                responses[2].invalid_point += 1;
            } else if d02 {
                award(responses, &[(0, 2), (2, 1)]);
                responses[1].invalid_point += 1;
            } else if identical(&responses[1], &responses[2]) && responses[1].valid {
                // Two agreeing non-null payloads outvote the first responder.
                award(responses, &[(1, 2), (2, 1)]);
                responses[0].invalid_point += 1;
            } else {
                responses[0].valid_point = 1;
            }
        }
    }
}

fn award(responses: &mut [DataResponse], points: &[(usize, u32)]) {
    for &(index, point) in points {
        responses[index].valid_point = point;
    }
}
