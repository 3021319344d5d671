use std::time::Duration;

use nom::{
    branch::alt,
    bytes::complete::{tag, take},
    combinator::{all_consuming, cond, flat_map, map, map_opt, map_res, verify},
    error::{Error, ErrorKind},
    multi::{count, length_data, many0, many_till},
    number::complete::{be_u16, be_u32, be_u8},
    sequence::tuple,
    IResult,
};

use super::{Flags, Header, Message, MessageType, Question, ResourceRecord};

const MAX_POINTER_JUMPS: usize = 16;

pub fn parse_message(packet: &[u8]) -> IResult<&[u8], Message> {
    let (rest, header) = parse_header(packet)?;
    let (rest, questions) = parse_questions(header.questions, packet, rest)?;
    let (rest, answer) = parse_resource_records(header.answer_resource_records, packet, rest)?;
    let (rest, authority) =
        parse_resource_records(header.authority_resource_records, packet, rest)?;
    let (rest, additional) =
        parse_resource_records(header.additional_resource_records, packet, rest)?;
    Ok((
        rest,
        Message {
            header,
            questions,
            answer,
            authority,
            additional,
        },
    ))
}

pub fn parse_header(packet: &[u8]) -> IResult<&[u8], Header> {
    let parse_header = tuple((be_u16, parse_flags, be_u16, be_u16, be_u16, be_u16));
    map(
        parse_header,
        |(
            id,
            flags,
            questions,
            answer_resource_records,
            authority_resource_records,
            additional_resource_records,
        )| Header {
            id,
            flags,
            questions,
            answer_resource_records,
            authority_resource_records,
            additional_resource_records,
        },
    )(packet)
}

/// TXT rdata: one or more length-prefixed character-strings filling the whole rdata.
pub fn parse_character_strings(data: &[u8]) -> Option<Vec<&[u8]>> {
    all_consuming::<_, _, Error<&[u8]>, _>(many0(length_data(be_u8)))(data)
        .ok()
        .map(|(_, strings)| strings)
}

fn parse_questions<'a>(
    questions_count: u16,
    packet: &'a [u8],
    questions: &'a [u8],
) -> IResult<&'a [u8], Option<Vec<Question<'a>>>> {
    cond(
        questions_count != 0,
        count(|i| parse_question(i, packet), questions_count as usize),
    )(questions)
}

fn parse_resource_records<'a>(
    records_count: u16,
    packet: &'a [u8],
    records: &'a [u8],
) -> IResult<&'a [u8], Option<Vec<ResourceRecord<'a>>>> {
    cond(
        records_count != 0,
        count(|i| parse_resource_record(i, packet), records_count as usize),
    )(records)
}

fn parse_resource_record<'a>(
    records: &'a [u8],
    packet: &'a [u8],
) -> IResult<&'a [u8], ResourceRecord<'a>> {
    let parse_ttl = map(be_u32, |ttl| Duration::from_secs(ttl as u64));
    let parse_r_data = flat_map(be_u16, take);
    let resource_record = tuple((
        |i| parse_name(i, packet),
        be_u16,
        be_u16,
        parse_ttl,
        parse_r_data,
    ));
    map_opt(resource_record, |(name, type_, class, ttl, r_data)| {
        ResourceRecord::from_raw(name, type_, class, ttl, r_data)
    })(records)
}

fn parse_question<'a>(questions: &'a [u8], packet: &'a [u8]) -> IResult<&'a [u8], Question<'a>> {
    let parse_question = tuple((|i| parse_name(i, packet), be_u16, be_u16));
    map(parse_question, |(name, type_, class)| Question {
        name,
        type_,
        class,
    })(questions)
}

fn parse_name<'a>(input: &'a [u8], packet: &'a [u8]) -> IResult<&'a [u8], Vec<&'a str>> {
    parse_name_with_jumps(input, packet, MAX_POINTER_JUMPS)
}

fn parse_name_with_jumps<'a>(
    input: &'a [u8],
    packet: &'a [u8],
    jumps_left: usize,
) -> IResult<&'a [u8], Vec<&'a str>> {
    let pointer_or_end = alt((map(parse_pointer, Some), map(tag("\0"), |_| None)));
    let (rest, (mut name, pointer)) = many_till(parse_label, pointer_or_end)(input)?;
    if let Some(pointer) = pointer {
        if jumps_left == 0 {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }
        let pointed = packet
            .get(pointer as usize..)
            .ok_or(nom::Err::Failure(Error::new(input, ErrorKind::Eof)))?;
        let (_, pointed_name) = parse_name_with_jumps(pointed, packet, jumps_left - 1)?;
        name.extend(pointed_name);
    }
    Ok((rest, name))
}

fn parse_pointer(label_part: &[u8]) -> IResult<&[u8], u16> {
    map(verify(be_u16, |word| word & 0xC000 == 0xC000), |word| {
        word & 0x3FFF
    })(label_part)
}

fn parse_label(label_part: &[u8]) -> IResult<&[u8], &str> {
    let label_len = verify(be_u8, |len| *len > 0 && *len < 64);
    map_res(flat_map(label_len, take), std::str::from_utf8)(label_part)
}

fn parse_flags(flags: &[u8]) -> IResult<&[u8], Flags> {
    map(be_u16, |flags| Flags {
        message_type: if flags & 0x8000 == 0 {
            MessageType::Query
        } else {
            MessageType::Response
        },
        response_code: ((flags & 0x000F) as u8).into(),
    })(flags)
}
